//! The multichain session negotiator.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use enclave_capabilities::caveat::{KeyringNamespace, keyring_namespaces};
use enclave_capabilities::{CapabilityKind, CapabilityRegistry};
use enclave_config::MultichainSection;
use enclave_core::{AccountId, ChainId, JsonRpcRequest, NamespaceId, Origin, PermissionSet, PluginId};
use enclave_events::{EnclaveEvent, EventMetadata, EventReceiver};
use enclave_executor::ExecutionSupervisor;
use futures::future::join_all;
use serde_json::{Map, Value, json};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::collaborator::{
    ApprovalRequest, GrantRequest, PermissionController, PluginDirectory, WALLET_SNAP,
    wallet_snap_grant,
};
use crate::error::{MultichainError, MultichainResult};
use crate::keyring;
use crate::store::SessionStore;
use crate::types::{ProvidedNamespaces, RequestedNamespaces, Session, SessionNamespace};

/// Approval type used to let a human pick plugins.
pub const MULTICHAIN_CONNECT: &str = "multichain_connect";

const EVENT_SOURCE: &str = "multichain";

/// Negotiator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatorOptions {
    /// Approval request type used for conflict resolution.
    pub approval_type: String,
    /// Whether bound plugins are told when a session closes.
    pub notify_on_close: bool,
}

impl Default for NegotiatorOptions {
    fn default() -> Self {
        Self {
            approval_type: MULTICHAIN_CONNECT.to_string(),
            notify_on_close: true,
        }
    }
}

impl From<&MultichainSection> for NegotiatorOptions {
    fn from(section: &MultichainSection) -> Self {
        Self {
            approval_type: section.approval_type.clone(),
            notify_on_close: section.notify_on_close,
        }
    }
}

/// Plugins offered for one namespace, each with its matching accounts.
type Offers = BTreeMap<NamespaceId, Vec<(PluginId, Vec<AccountId>)>>;

/// The plugin and accounts chosen for each namespace.
type Bindings = BTreeMap<NamespaceId, (PluginId, Vec<AccountId>)>;

/// Binds origins' requested namespaces to keyring plugins and routes their
/// requests.
///
/// Cheap to clone; clones share the session store.
#[derive(Clone)]
pub struct SessionNegotiator {
    registry: Arc<CapabilityRegistry>,
    supervisor: ExecutionSupervisor,
    permissions: Arc<dyn PermissionController>,
    plugins: Arc<dyn PluginDirectory>,
    store: SessionStore,
    options: NegotiatorOptions,
}

impl SessionNegotiator {
    /// Create a negotiator with default options.
    #[must_use]
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        supervisor: ExecutionSupervisor,
        permissions: Arc<dyn PermissionController>,
        plugins: Arc<dyn PluginDirectory>,
    ) -> Self {
        Self {
            registry,
            supervisor,
            permissions,
            plugins,
            store: SessionStore::new(),
            options: NegotiatorOptions::default(),
        }
    }

    /// Replace the options.
    #[must_use]
    pub fn with_options(mut self, options: NegotiatorOptions) -> Self {
        self.options = options;
        self
    }

    /// The session store.
    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Negotiate a session for `origin`, replacing any existing one.
    ///
    /// Returns the namespaces the session provides.
    ///
    /// # Errors
    ///
    /// - [`MultichainError::NoMatch`] if no plugin offers an account for any
    ///   requested namespace, or the human selected nothing
    /// - [`MultichainError::Collaborator`] if a collaborator fails or the
    ///   approval is rejected
    /// - [`MultichainError::Execution`] if a bound plugin stopped before its
    ///   reference could be taken
    ///
    /// On error no session is stored; a session replaced by this call stays
    /// closed.
    pub async fn connect(
        &self,
        origin: &Origin,
        requested: RequestedNamespaces,
    ) -> MultichainResult<ProvidedNamespaces> {
        let mut slot = self.store.lock(origin).await;
        if let Some(previous) = self.store.take(&mut slot) {
            debug!(origin = %origin, "Closing previous session before reconnecting");
            self.teardown(&previous, None);
        }

        let (session, references) = match self.negotiate(origin, requested).await {
            Ok(negotiated) => negotiated,
            Err(e) => {
                drop(slot);
                self.store.prune(origin);
                return Err(e);
            },
        };

        let provided = session.provided_namespaces.clone();
        let plugins: Vec<PluginId> = session.bound_plugins().into_iter().collect();
        info!(
            origin = %origin,
            namespaces = provided.len(),
            plugins = plugins.len(),
            "Session established"
        );
        self.store.insert(&mut slot, session);
        references.keep();
        drop(slot);

        self.supervisor.events().publish(EnclaveEvent::SessionCreated {
            metadata: EventMetadata::new(EVENT_SOURCE),
            origin: origin.clone(),
            plugins,
        });
        Ok(provided)
    }

    /// Forward `request` for `chain_id` to the plugin bound to its namespace
    /// and return the plugin's answer verbatim.
    ///
    /// # Errors
    ///
    /// - [`MultichainError::NoSession`] if the origin has no session
    /// - [`MultichainError::UnsupportedChain`] if the chain is not provided
    /// - [`MultichainError::UnsupportedMethod`] if the method is not allowed
    /// - [`MultichainError::PermissionRevoked`] if the origin lost its grant
    /// - [`MultichainError::Execution`] with the plugin's own error
    pub async fn request(
        &self,
        origin: &Origin,
        chain_id: &ChainId,
        request: JsonRpcRequest,
    ) -> MultichainResult<Value> {
        let plugin_id = {
            let slot = self
                .store
                .lock_existing(origin)
                .await
                .ok_or_else(|| MultichainError::NoSession(origin.clone()))?;
            let session = slot
                .as_ref()
                .ok_or_else(|| MultichainError::NoSession(origin.clone()))?;

            let namespace = chain_id.namespace();
            let provided = session
                .provided_namespaces
                .get(&namespace)
                .filter(|ns| ns.chains.contains(chain_id))
                .ok_or_else(|| MultichainError::UnsupportedChain(chain_id.clone()))?;

            if !provided.methods.iter().any(|m| *m == request.method) {
                return Err(MultichainError::UnsupportedMethod {
                    namespace,
                    method: request.method,
                });
            }

            let plugin_id = session
                .handling_plugins
                .get(&namespace)
                .cloned()
                .ok_or_else(|| MultichainError::UnsupportedChain(chain_id.clone()))?;

            if !self.permissions.has_permission(origin, &plugin_id).await? {
                return Err(MultichainError::PermissionRevoked {
                    origin: origin.clone(),
                    plugin_id,
                });
            }
            plugin_id
        };

        debug!(
            origin = %origin,
            chain_id = %chain_id,
            plugin_id = %plugin_id,
            method = %request.method,
            "Forwarding session request"
        );
        Ok(keyring::handle_request(&self.supervisor, origin, &plugin_id, chain_id, &request).await?)
    }

    /// Close the origin's session.
    ///
    /// Bound plugins are notified in the background, the session is deleted
    /// and their active references are released.
    ///
    /// # Errors
    ///
    /// Returns [`MultichainError::NoSession`] if the origin has no session.
    pub async fn close_session(&self, origin: &Origin) -> MultichainResult<()> {
        {
            let mut slot = self
                .store
                .lock_existing(origin)
                .await
                .ok_or_else(|| MultichainError::NoSession(origin.clone()))?;
            let session = self
                .store
                .take(&mut slot)
                .ok_or_else(|| MultichainError::NoSession(origin.clone()))?;
            self.teardown(&session, None);
        }
        self.store.prune(origin);
        info!(origin = %origin, "Session closed");
        Ok(())
    }

    /// The origin's current session.
    pub async fn get_session(&self, origin: &Origin) -> Option<Session> {
        self.store.lock_existing(origin).await?.clone()
    }

    /// Drop every session bound to a plugin whose runtime crashed.
    ///
    /// References on the other plugins those sessions bound are released and
    /// those plugins are notified. The crashed plugin's count is left alone;
    /// the supervisor already reset it. Returns how many sessions were closed.
    ///
    /// Origins are cleaned up concurrently, so one origin busy negotiating
    /// does not hold up the others.
    pub async fn handle_plugin_crashed(&self, plugin_id: &PluginId) -> usize {
        let origins = self.store.origins_binding(plugin_id);
        let closed = join_all(
            origins
                .iter()
                .map(|origin| self.close_crashed(origin, plugin_id)),
        )
        .await;
        closed.into_iter().filter(|closed| *closed).count()
    }

    async fn close_crashed(&self, origin: &Origin, plugin_id: &PluginId) -> bool {
        let Some(mut slot) = self.store.lock_existing(origin).await else {
            return false;
        };
        // The session may have been replaced while we waited.
        if !slot.as_ref().is_some_and(|s| s.binds(plugin_id)) {
            return false;
        }
        let Some(session) = self.store.take(&mut slot) else {
            return false;
        };
        warn!(
            origin = %origin,
            plugin_id = %plugin_id,
            "Closing session bound to crashed plugin"
        );
        self.teardown(&session, Some(plugin_id));
        drop(slot);
        self.store.prune(origin);
        true
    }

    /// Run [`handle_plugin_crashed`](Self::handle_plugin_crashed) for every
    /// `PluginCrashed` event `events` delivers, until the bus closes.
    ///
    /// Each crash is handled on its own task so the receiver keeps draining
    /// the bus.
    #[must_use]
    pub fn spawn_crash_listener(&self, mut events: EventReceiver) -> JoinHandle<()> {
        let negotiator = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let EnclaveEvent::PluginCrashed { plugin_id, .. } = event.as_ref() {
                    let negotiator = negotiator.clone();
                    let plugin_id = plugin_id.clone();
                    tokio::spawn(async move {
                        let closed = negotiator.handle_plugin_crashed(&plugin_id).await;
                        debug!(plugin_id = %plugin_id, sessions = closed, "Handled plugin crash");
                    });
                }
            }
        })
    }

    // -----------------------------------------------------------------------
    // Negotiation steps
    // -----------------------------------------------------------------------

    async fn negotiate(
        &self,
        origin: &Origin,
        requested: RequestedNamespaces,
    ) -> MultichainResult<(Session, Acquired<'_>)> {
        let declared = self.keyring_support().await?;
        let candidates = candidates_by_namespace(&requested, &declared);

        let mut approved = BTreeSet::new();
        for plugin_id in distinct(candidates.values().flatten()) {
            if self.permissions.has_permission(origin, &plugin_id).await? {
                approved.insert(plugin_id);
            }
        }

        // Every requested namespace needs exactly one approved candidate,
        // otherwise the full candidate set goes to the human. A namespace
        // nobody serves has none.
        let conflict = requested.keys().any(|ns| {
            candidates.get(ns).map_or(0, |plugins| {
                plugins.iter().filter(|p| approved.contains(*p)).count()
            }) != 1
        });
        let choices: BTreeMap<NamespaceId, Vec<PluginId>> = if conflict {
            candidates
        } else {
            candidates
                .into_iter()
                .map(|(ns, plugins)| {
                    let kept = plugins.into_iter().filter(|p| approved.contains(p)).collect();
                    (ns, kept)
                })
                .collect()
        };

        let offers = self.collect_offers(origin, &requested, &choices).await;
        if offers.is_empty() {
            info!(origin = %origin, "No plugin offers accounts for the requested namespaces");
            return Err(MultichainError::NoMatch);
        }

        let bindings = if conflict {
            self.ask_user(origin, offers).await?
        } else {
            offers
                .into_iter()
                .filter_map(|(ns, plugins)| plugins.into_iter().next().map(|first| (ns, first)))
                .collect()
        };
        if bindings.is_empty() {
            return Err(MultichainError::NoMatch);
        }

        let plugins: BTreeSet<PluginId> = bindings.values().map(|(p, _)| p.clone()).collect();
        let references = self.acquire(&plugins)?;
        self.permissions
            .grant_permissions(GrantRequest {
                approved_permissions: PermissionSet::from([(
                    WALLET_SNAP.to_string(),
                    wallet_snap_grant(&plugins),
                )]),
                subject: origin.clone(),
                preserve_existing: true,
            })
            .await?;

        let mut provided = BTreeMap::new();
        let mut handling = BTreeMap::new();
        for (ns, (plugin_id, accounts)) in bindings {
            if let Some(request) = requested.get(&ns) {
                provided.insert(ns.clone(), SessionNamespace::provide(request, accounts));
                handling.insert(ns, plugin_id);
            }
        }

        let session = Session {
            origin: origin.clone(),
            requested_namespaces: requested,
            provided_namespaces: provided,
            handling_plugins: handling,
        };
        Ok((session, references))
    }

    /// Runnable plugins holding a valid keyring grant, with the namespaces
    /// they declare.
    async fn keyring_support(
        &self,
    ) -> MultichainResult<Vec<(PluginId, BTreeMap<NamespaceId, KeyringNamespace>)>> {
        let keyring = CapabilityKind::Keyring.default_name();
        let mut supported = Vec::new();

        for plugin in self.plugins.list_plugins().await? {
            if !plugin.is_runnable() {
                continue;
            }
            if !self.supervisor.is_running(&plugin.id) {
                debug!(plugin_id = %plugin.id, "Skipping plugin without a running runtime");
                continue;
            }
            let Some(permissions) = self.permissions.get_permissions(plugin.id.as_str()).await?
            else {
                continue;
            };
            let Some(grant) = permissions.get(keyring) else {
                continue;
            };
            if let Err(e) = self.registry.validate_grant(grant) {
                warn!(plugin_id = %plugin.id, error = %e, "Ignoring invalid keyring grant");
                continue;
            }
            match keyring_namespaces(grant) {
                Ok(Some(namespaces)) => supported.push((plugin.id, namespaces)),
                Ok(None) => debug!(plugin_id = %plugin.id, "Keyring grant declares no namespaces"),
                Err(e) => warn!(plugin_id = %plugin.id, error = %e, "Ignoring invalid keyring grant"),
            }
        }
        Ok(supported)
    }

    /// Fetch accounts from every plugin in `choices` once, concurrently, and
    /// keep per namespace the plugins offering at least one matching account.
    async fn collect_offers(
        &self,
        origin: &Origin,
        requested: &RequestedNamespaces,
        choices: &BTreeMap<NamespaceId, Vec<PluginId>>,
    ) -> Offers {
        let mut chains: BTreeMap<PluginId, BTreeSet<ChainId>> = BTreeMap::new();
        for (ns, plugins) in choices {
            let Some(request) = requested.get(ns) else {
                continue;
            };
            for plugin_id in plugins {
                chains
                    .entry(plugin_id.clone())
                    .or_default()
                    .extend(request.chains.iter().cloned());
            }
        }

        let fetched = join_all(chains.into_iter().map(|(plugin_id, chains)| async move {
            let chains: Vec<ChainId> = chains.into_iter().collect();
            let accounts = keyring::get_accounts(&self.supervisor, origin, &plugin_id, &chains).await;
            (plugin_id, accounts)
        }))
        .await;
        let accounts: HashMap<PluginId, Vec<AccountId>> = fetched.into_iter().collect();

        let mut offers = Offers::new();
        for (ns, plugins) in choices {
            let Some(request) = requested.get(ns) else {
                continue;
            };
            let offered: Vec<(PluginId, Vec<AccountId>)> = plugins
                .iter()
                .filter_map(|plugin_id| {
                    let matching: Vec<AccountId> = accounts
                        .get(plugin_id)?
                        .iter()
                        .filter(|a| request.chains.contains(&a.chain_id()))
                        .cloned()
                        .collect();
                    (!matching.is_empty()).then(|| (plugin_id.clone(), matching))
                })
                .collect();
            if !offered.is_empty() {
                offers.insert(ns.clone(), offered);
            }
        }
        offers
    }

    /// Show every offer to the human and bind what they pick.
    async fn ask_user(&self, origin: &Origin, offers: Offers) -> MultichainResult<Bindings> {
        let request_data: Map<String, Value> = offers
            .iter()
            .map(|(ns, plugins)| {
                let entries: Vec<Value> = plugins
                    .iter()
                    .map(|(plugin_id, accounts)| json!({"pluginId": plugin_id, "accounts": accounts}))
                    .collect();
                (ns.to_string(), Value::Array(entries))
            })
            .collect();

        let request = ApprovalRequest {
            origin: origin.clone(),
            id: Uuid::new_v4().to_string(),
            approval_type: self.options.approval_type.clone(),
            request_data: Value::Object(request_data),
        };
        info!(
            origin = %origin,
            request_id = %request.id,
            namespaces = offers.len(),
            "Requesting plugin selection"
        );

        let answer = self.permissions.add_approval_request(request, true).await?;
        let Value::Object(selection) = answer else {
            return Err(MultichainError::Collaborator(
                "plugin selection is not an object".to_string(),
            ));
        };

        let mut bindings = Bindings::new();
        for (ns, plugins) in offers {
            match selection.get(ns.as_str()) {
                None | Some(Value::Null) => {
                    debug!(origin = %origin, namespace = %ns, "No plugin selected");
                },
                Some(Value::String(choice)) => {
                    match plugins.into_iter().find(|(p, _)| p.as_str() == choice) {
                        Some(offer) => {
                            bindings.insert(ns, offer);
                        },
                        None => warn!(
                            origin = %origin,
                            namespace = %ns,
                            choice = %choice,
                            "Ignoring selection of a plugin that was not offered"
                        ),
                    }
                },
                Some(other) => warn!(
                    origin = %origin,
                    namespace = %ns,
                    choice = %other,
                    "Ignoring malformed plugin selection"
                ),
            }
        }
        Ok(bindings)
    }

    // -----------------------------------------------------------------------
    // References
    // -----------------------------------------------------------------------

    /// Take one reference on each plugin, all or none.
    fn acquire(&self, plugins: &BTreeSet<PluginId>) -> MultichainResult<Acquired<'_>> {
        let mut taken = Acquired {
            supervisor: &self.supervisor,
            plugins: Vec::with_capacity(plugins.len()),
        };
        for plugin_id in plugins {
            if let Err(e) = self.supervisor.increment_active_references(plugin_id) {
                warn!(plugin_id = %plugin_id, error = %e, "Could not reference bound plugin");
                return Err(e.into());
            }
            taken.plugins.push(plugin_id.clone());
        }
        Ok(taken)
    }

    /// Release a removed session: notify and unreference its plugins except
    /// `crashed`, then announce the closure.
    fn teardown(&self, session: &Session, crashed: Option<&PluginId>) {
        let plugins: Vec<PluginId> = session
            .bound_plugins()
            .into_iter()
            .filter(|p| Some(p) != crashed)
            .collect();

        if self.options.notify_on_close {
            keyring::notify_disconnect(&self.supervisor, &session.origin, plugins.iter().cloned());
        }
        for plugin_id in &plugins {
            self.supervisor.decrement_active_references(plugin_id);
        }

        self.supervisor.events().publish(EnclaveEvent::SessionClosed {
            metadata: EventMetadata::new(EVENT_SOURCE),
            origin: session.origin.clone(),
        });
    }
}

/// References taken for a session that is not stored yet. Released on drop
/// unless [`keep`](Self::keep) hands them over to the stored session.
struct Acquired<'a> {
    supervisor: &'a ExecutionSupervisor,
    plugins: Vec<PluginId>,
}

impl Acquired<'_> {
    fn keep(mut self) {
        self.plugins.clear();
    }
}

impl Drop for Acquired<'_> {
    fn drop(&mut self) {
        for plugin_id in &self.plugins {
            debug!(plugin_id = %plugin_id, "Releasing reference of abandoned session");
            self.supervisor.decrement_active_references(plugin_id);
        }
    }
}

impl fmt::Debug for SessionNegotiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionNegotiator")
            .field("store", &self.store)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Plugins per requested namespace that declare it and serve at least one of
/// its requested chains. Namespaces nobody serves are left out.
fn candidates_by_namespace(
    requested: &RequestedNamespaces,
    declared: &[(PluginId, BTreeMap<NamespaceId, KeyringNamespace>)],
) -> BTreeMap<NamespaceId, Vec<PluginId>> {
    requested
        .iter()
        .filter_map(|(ns, request)| {
            let plugins: Vec<PluginId> = declared
                .iter()
                .filter(|(_, namespaces)| {
                    namespaces
                        .get(ns)
                        .is_some_and(|k| request.chains.iter().any(|c| k.serves(c)))
                })
                .map(|(id, _)| id.clone())
                .collect();
            (!plugins.is_empty()).then(|| (ns.clone(), plugins))
        })
        .collect()
}

/// First-seen order, duplicates dropped.
fn distinct<'a>(ids: impl IntoIterator<Item = &'a PluginId>) -> Vec<PluginId> {
    let mut seen = BTreeSet::new();
    ids.into_iter()
        .filter(|id| seen.insert(*id))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use enclave_capabilities::caveat::KeyringChain;

    use super::*;
    use crate::types::RequestNamespace;

    fn ns(s: &str) -> NamespaceId {
        NamespaceId::new(s).unwrap()
    }

    fn chain(s: &str) -> ChainId {
        ChainId::new(s).unwrap()
    }

    fn declares(chains: &[&str]) -> KeyringNamespace {
        KeyringNamespace {
            chains: chains
                .iter()
                .map(|c| KeyringChain {
                    id: chain(c),
                    name: (*c).to_string(),
                })
                .collect(),
            methods: Vec::new(),
            events: Vec::new(),
        }
    }

    #[test]
    fn test_candidates_need_a_shared_chain() {
        let a = PluginId::from_static("npm:a");
        let b = PluginId::from_static("npm:b");
        let declared = vec![
            (a.clone(), BTreeMap::from([(ns("eip155"), declares(&["eip155:1"]))])),
            (b.clone(), BTreeMap::from([(ns("eip155"), declares(&["eip155:5"]))])),
        ];
        let requested = RequestedNamespaces::from([
            (ns("eip155"), RequestNamespace::new(vec![chain("eip155:1")])),
            (ns("bip122"), RequestNamespace::new(vec![chain("bip122:abc")])),
        ]);

        let candidates = candidates_by_namespace(&requested, &declared);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[&ns("eip155")], vec![a]);
    }

    #[test]
    fn test_distinct_keeps_first_seen_order() {
        let a = PluginId::from_static("npm:a");
        let b = PluginId::from_static("npm:b");
        assert_eq!(distinct([&b, &a, &b]), vec![b, a]);
    }

    #[test]
    fn test_options_from_section() {
        let section = MultichainSection {
            approval_type: "pick".to_string(),
            notify_on_close: false,
        };
        let options = NegotiatorOptions::from(&section);
        assert_eq!(options.approval_type, "pick");
        assert!(!options.notify_on_close);
        assert_eq!(NegotiatorOptions::default().approval_type, MULTICHAIN_CONNECT);
    }
}
