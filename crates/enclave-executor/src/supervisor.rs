//! The execution supervisor.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use enclave_config::ExecutorSection;
use enclave_core::{
    HandlerType, JsonRpcError, JsonRpcRequest, JsonRpcResponse, Origin, PluginId, error_codes,
};
use enclave_events::{EnclaveEvent, EventBus, EventMetadata};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::backend::{RuntimeBackend, RuntimeChannel};
use crate::envelope::{
    EXECUTE_SNAP, Inbound, SNAP_RPC, classify, execute_snap_params, snap_rpc_params,
};
use crate::error::{ExecutorError, ExecutorResult};
use crate::process::{ProcessBackend, ProcessBackendConfig};
use crate::relay::{MessageRelay, RelayMessage};
use crate::runtime::{PluginState, RuntimeHandle};

const EVENT_SOURCE: &str = "executor";

/// A call to one of a plugin's handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcCall {
    /// Who the call is made on behalf of.
    pub origin: Origin,
    /// The handler to invoke.
    pub handler: HandlerType,
    /// The JSON-RPC request handed to the handler.
    pub request: JsonRpcRequest,
}

impl RpcCall {
    /// Create a call.
    #[must_use]
    pub fn new(origin: Origin, handler: HandlerType, request: JsonRpcRequest) -> Self {
        Self {
            origin,
            handler,
            request,
        }
    }
}

/// A runtime table entry. The id is reserved before the backend is asked
/// for a channel so that concurrent starts of one plugin cannot both win.
enum Slot {
    Reserved(u64),
    Live(Arc<RuntimeHandle>),
}

impl Slot {
    fn generation(&self) -> u64 {
        match self {
            Self::Reserved(generation) => *generation,
            Self::Live(handle) => handle.generation(),
        }
    }
}

struct Inner {
    backend: Arc<dyn RuntimeBackend>,
    relay: RwLock<Option<Arc<dyn MessageRelay>>>,
    events: EventBus,
    runtimes: DashMap<PluginId, Slot>,
    generation: AtomicU64,
}

impl Inner {
    fn relay(&self) -> Option<Arc<dyn MessageRelay>> {
        self.relay
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn live(&self, plugin_id: &PluginId) -> Option<Arc<RuntimeHandle>> {
        self.runtimes
            .get(plugin_id)
            .and_then(|slot| match &*slot {
                Slot::Live(handle) => Some(Arc::clone(handle)),
                Slot::Reserved(_) => None,
            })
    }

    fn remove_generation(&self, plugin_id: &PluginId, generation: u64) {
        self.runtimes
            .remove_if(plugin_id, |_, slot| slot.generation() == generation);
    }
}

/// Starts, addresses and tears down one isolated runtime per plugin.
///
/// Cheap to clone; clones share the runtime table.
#[derive(Clone)]
pub struct ExecutionSupervisor {
    inner: Arc<Inner>,
}

impl ExecutionSupervisor {
    /// Create a supervisor using `backend` to create runtimes and publishing
    /// lifecycle events on `events`.
    #[must_use]
    pub fn new(backend: Arc<dyn RuntimeBackend>, events: EventBus) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                relay: RwLock::new(None),
                events,
                runtimes: DashMap::new(),
                generation: AtomicU64::new(1),
            }),
        }
    }

    /// Create a supervisor spawning runtime processes as configured, with a
    /// fresh event bus sized from the same section.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::Backend`] if no runtime command is configured.
    pub fn from_config(section: &ExecutorSection) -> ExecutorResult<Self> {
        let backend = ProcessBackend::new(ProcessBackendConfig::try_from(section)?);
        Ok(Self::new(
            Arc::new(backend),
            EventBus::with_capacity(section.event_capacity),
        ))
    }

    /// Install the handler for messages plugins send on their own initiative.
    pub fn set_relay(&self, relay: Arc<dyn MessageRelay>) {
        *self
            .inner
            .relay
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(relay);
    }

    /// The bus lifecycle events are published on.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Start a runtime for `plugin_id`, load `source_code` into it with
    /// exactly `endowments` injected, and wait for it to acknowledge.
    ///
    /// The endowments are taken as given; permissions are not consulted here.
    ///
    /// # Errors
    ///
    /// - [`ExecutorError::AlreadyRunning`] if the plugin is starting or running
    /// - [`ExecutorError::Backend`] if the backend cannot create a runtime
    /// - any error the runtime returns for the `executeSnap` command, or
    ///   [`ExecutorError::PluginCrashed`] if it dies before acknowledging
    ///
    /// On error the plugin is left unloaded.
    pub async fn execute_plugin(
        &self,
        plugin_id: &PluginId,
        source_code: &str,
        endowments: &[String],
    ) -> ExecutorResult<()> {
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
        match self.inner.runtimes.entry(plugin_id.clone()) {
            Entry::Occupied(_) => return Err(ExecutorError::AlreadyRunning(plugin_id.clone())),
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::Reserved(generation));
            },
        }

        let mut guard = StartGuard {
            inner: &self.inner,
            plugin_id,
            generation,
            handle: None,
            armed: true,
        };

        info!(
            plugin_id = %plugin_id,
            endowments = endowments.len(),
            "Starting plugin runtime"
        );

        let RuntimeChannel { outbound, inbound } = self.inner.backend.spawn(plugin_id).await?;
        let handle = Arc::new(RuntimeHandle::new(plugin_id.clone(), generation, outbound));

        {
            let Some(mut slot) = self.inner.runtimes.get_mut(plugin_id) else {
                return Err(ExecutorError::PluginNotRunning(plugin_id.clone()));
            };
            if slot.generation() != generation {
                return Err(ExecutorError::PluginNotRunning(plugin_id.clone()));
            }
            *slot = Slot::Live(Arc::clone(&handle));
        }
        guard.handle = Some(Arc::clone(&handle));

        let reader = tokio::spawn(read_loop(
            Arc::downgrade(&self.inner),
            Arc::clone(&handle),
            inbound,
        ));
        handle.attach_reader(reader);

        handle
            .call(
                EXECUTE_SNAP,
                execute_snap_params(plugin_id, source_code, endowments),
            )
            .await?;

        if !handle.mark_running() {
            return Err(ExecutorError::PluginNotRunning(plugin_id.clone()));
        }
        guard.armed = false;

        info!(plugin_id = %plugin_id, "Plugin runtime running");
        self.inner.events.publish(EnclaveEvent::PluginStarted {
            metadata: EventMetadata::new(EVENT_SOURCE),
            plugin_id: plugin_id.clone(),
        });
        Ok(())
    }

    /// Tear down the plugin's runtime unconditionally.
    ///
    /// Active references are reset to zero and in-flight calls fail with
    /// [`ExecutorError::PluginNotRunning`]. Callers terminating voluntarily
    /// should check [`active_references`](Self::active_references) first.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::PluginNotRunning`] if there is no runtime.
    pub fn terminate_plugin(&self, plugin_id: &PluginId) -> ExecutorResult<()> {
        let Some((_, slot)) = self.inner.runtimes.remove(plugin_id) else {
            return Err(ExecutorError::PluginNotRunning(plugin_id.clone()));
        };

        if let Slot::Live(handle) = slot {
            let outstanding = handle.references();
            if outstanding > 0 {
                warn!(
                    plugin_id = %plugin_id,
                    references = outstanding,
                    "Terminating plugin with active references"
                );
            }
            handle.shutdown(&ExecutorError::PluginNotRunning(plugin_id.clone()));
        }

        info!(plugin_id = %plugin_id, "Plugin runtime terminated");
        self.inner.events.publish(EnclaveEvent::PluginTerminated {
            metadata: EventMetadata::new(EVENT_SOURCE),
            plugin_id: plugin_id.clone(),
        });
        Ok(())
    }

    /// Tear down every runtime. Returns how many were terminated.
    pub fn terminate_all_plugins(&self) -> usize {
        let ids: Vec<PluginId> = self
            .inner
            .runtimes
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        let mut terminated: usize = 0;
        for id in ids {
            if self.terminate_plugin(&id).is_ok() {
                terminated = terminated.saturating_add(1);
            }
        }
        terminated
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    /// Invoke one of the plugin's handlers and wait for its answer.
    ///
    /// Safe to call concurrently for the same plugin. There is no timeout;
    /// dropping the future abandons the call on the host side only.
    ///
    /// # Errors
    ///
    /// - [`ExecutorError::PluginNotRunning`] unless the plugin is running
    /// - [`ExecutorError::Plugin`] with the plugin's error, see
    ///   [`unwrap_response`](crate::unwrap_response)
    /// - [`ExecutorError::PluginCrashed`] if the runtime dies mid-call
    pub async fn handle_rpc_request(&self, plugin_id: &PluginId, call: RpcCall) -> ExecutorResult<Value> {
        let handle = self
            .inner
            .live(plugin_id)
            .filter(|h| h.state() == PluginState::Running)
            .ok_or_else(|| ExecutorError::PluginNotRunning(plugin_id.clone()))?;

        debug!(
            plugin_id = %plugin_id,
            origin = %call.origin,
            handler = %call.handler,
            method = %call.request.method,
            "Forwarding request to plugin"
        );

        let params = snap_rpc_params(plugin_id, &call.origin, call.handler, &call.request);
        handle.call(SNAP_RPC, params).await
    }

    // -----------------------------------------------------------------------
    // Active references
    // -----------------------------------------------------------------------

    /// Take an active reference on the plugin's runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::PluginNotRunning`] if no runtime exists.
    pub fn increment_active_references(&self, plugin_id: &PluginId) -> ExecutorResult<usize> {
        let handle = self
            .inner
            .live(plugin_id)
            .filter(|h| h.state() != PluginState::Terminating)
            .ok_or_else(|| ExecutorError::PluginNotRunning(plugin_id.clone()))?;
        let count = handle.increment();
        debug!(plugin_id = %plugin_id, references = count, "Active reference taken");
        Ok(count)
    }

    /// Release an active reference. Returns the remaining count.
    ///
    /// Releasing against a plugin that is no longer loaded does nothing:
    /// tearing it down already dropped every reference. Releasing more
    /// references than were taken is a caller bug; it asserts in debug builds
    /// and leaves the count at zero otherwise.
    pub fn decrement_active_references(&self, plugin_id: &PluginId) -> usize {
        let Some(handle) = self.inner.live(plugin_id) else {
            debug!(plugin_id = %plugin_id, "Ignoring reference release for unloaded plugin");
            return 0;
        };

        let remaining = handle.decrement();
        if remaining.is_none() {
            error!(plugin_id = %plugin_id, "Active reference count underflow");
        }
        debug_assert!(
            remaining.is_some(),
            "active reference count underflow for {plugin_id}"
        );
        let remaining = remaining.unwrap_or(0);
        debug!(plugin_id = %plugin_id, references = remaining, "Active reference released");
        remaining
    }

    /// Current active reference count; zero when unloaded.
    #[must_use]
    pub fn active_references(&self, plugin_id: &PluginId) -> usize {
        self.inner
            .live(plugin_id)
            .map_or(0, |handle| handle.references())
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Lifecycle state of the plugin's runtime.
    #[must_use]
    pub fn state(&self, plugin_id: &PluginId) -> PluginState {
        match self.inner.runtimes.get(plugin_id).as_deref() {
            None => PluginState::Unloaded,
            Some(Slot::Reserved(_)) => PluginState::Starting,
            Some(Slot::Live(handle)) => handle.state(),
        }
    }

    /// Whether the plugin is running.
    #[must_use]
    pub fn is_running(&self, plugin_id: &PluginId) -> bool {
        self.state(plugin_id) == PluginState::Running
    }

    /// Ids of all running plugins, sorted.
    #[must_use]
    pub fn running_plugins(&self) -> Vec<PluginId> {
        let mut ids: Vec<PluginId> = self
            .inner
            .runtimes
            .iter()
            .filter(|entry| {
                matches!(entry.value(), Slot::Live(h) if h.state() == PluginState::Running)
            })
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }
}

impl fmt::Debug for ExecutionSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionSupervisor")
            .field("runtimes", &self.inner.runtimes.len())
            .finish_non_exhaustive()
    }
}

/// Undoes a half-finished start when `execute_plugin` errors or is dropped.
struct StartGuard<'a> {
    inner: &'a Inner,
    plugin_id: &'a PluginId,
    generation: u64,
    handle: Option<Arc<RuntimeHandle>>,
    armed: bool,
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.inner.remove_generation(self.plugin_id, self.generation);
        if let Some(handle) = &self.handle {
            handle.shutdown(&ExecutorError::PluginNotRunning(self.plugin_id.clone()));
        }
        debug!(plugin_id = %self.plugin_id, "Abandoned plugin start");
    }
}

// ---------------------------------------------------------------------------
// Reader loop
// ---------------------------------------------------------------------------

async fn read_loop(inner: Weak<Inner>, handle: Arc<RuntimeHandle>, mut inbound: mpsc::Receiver<Value>) {
    while let Some(message) = inbound.recv().await {
        match classify(message) {
            Inbound::Response { id, message } => {
                if !handle.complete(&id, message) {
                    debug!(
                        plugin_id = %handle.plugin_id(),
                        request_id = %id,
                        "Dropping reply with no pending request"
                    );
                }
            },
            Inbound::Request(request) => {
                let relay = inner.upgrade().and_then(|i| i.relay());
                tokio::spawn(answer_plugin_request(relay, Arc::clone(&handle), request));
            },
            Inbound::Notification(notification) => {
                if let Some(relay) = inner.upgrade().and_then(|i| i.relay()) {
                    let plugin_id = handle.plugin_id().clone();
                    tokio::spawn(async move {
                        if let Err(e) = relay
                            .relay(&plugin_id, RelayMessage::Notification(notification))
                            .await
                        {
                            debug!(plugin_id = %plugin_id, error = %e, "Relay rejected notification");
                        }
                    });
                }
            },
            Inbound::Invalid(raw) => {
                warn!(plugin_id = %handle.plugin_id(), "Discarding malformed message from runtime");
                debug!(plugin_id = %handle.plugin_id(), message = %raw, "Malformed runtime message");
            },
        }
    }

    if handle.state() == PluginState::Terminating {
        debug!(plugin_id = %handle.plugin_id(), "Runtime channel closed after termination");
        return;
    }

    let plugin_id = handle.plugin_id().clone();
    let reason = "runtime channel closed unexpectedly".to_string();
    warn!(plugin_id = %plugin_id, reason = %reason, "Plugin runtime crashed");

    if let Some(inner) = inner.upgrade() {
        inner.remove_generation(&plugin_id, handle.generation());
        handle.release(&ExecutorError::PluginCrashed {
            plugin_id: plugin_id.clone(),
            reason: reason.clone(),
        });
        inner.events.publish(EnclaveEvent::PluginCrashed {
            metadata: EventMetadata::new(EVENT_SOURCE),
            plugin_id,
            reason,
        });
    } else {
        handle.release(&ExecutorError::PluginCrashed { plugin_id, reason });
    }
}

async fn answer_plugin_request(
    relay: Option<Arc<dyn MessageRelay>>,
    handle: Arc<RuntimeHandle>,
    request: JsonRpcRequest,
) {
    let id = request.id.clone();
    let reply = match relay {
        Some(relay) => relay
            .relay(handle.plugin_id(), RelayMessage::Request(request))
            .await,
        None => Err(JsonRpcError::new(
            error_codes::METHOD_NOT_FOUND,
            format!("The method \"{}\" does not exist / is not available.", request.method),
        )),
    };

    let response = match reply {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(error) => JsonRpcResponse::failure(id, error),
    };
    let message = match serde_json::to_value(&response) {
        Ok(message) => message,
        Err(e) => {
            error!(plugin_id = %handle.plugin_id(), error = %e, "Failed to encode relay reply");
            return;
        },
    };
    if let Err(e) = handle.send(message).await {
        debug!(plugin_id = %handle.plugin_id(), error = %e, "Could not deliver relay reply");
    }
}
