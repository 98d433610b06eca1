//! Session data.

use std::collections::{BTreeMap, BTreeSet};

use enclave_core::{AccountId, ChainId, NamespaceId, Origin, PluginId};
use serde::{Deserialize, Serialize};

/// What an origin asks for within one namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestNamespace {
    /// Chains the origin wants to use.
    pub chains: Vec<ChainId>,
    /// JSON-RPC methods the origin wants to call.
    #[serde(default)]
    pub methods: Vec<String>,
    /// Events the origin wants to receive.
    #[serde(default)]
    pub events: Vec<String>,
}

impl RequestNamespace {
    /// Request `chains` with no methods or events.
    #[must_use]
    pub fn new(chains: Vec<ChainId>) -> Self {
        Self {
            chains,
            ..Default::default()
        }
    }

    /// Allow a method.
    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.methods.push(method.into());
        self
    }

    /// Subscribe to an event.
    #[must_use]
    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.events.push(event.into());
        self
    }
}

/// What a session provides within one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionNamespace {
    /// Chains usable in the session.
    pub chains: Vec<ChainId>,
    /// Methods callable in the session.
    pub methods: Vec<String>,
    /// Events delivered in the session.
    pub events: Vec<String>,
    /// Accounts the bound plugin offered.
    pub accounts: Vec<AccountId>,
}

impl SessionNamespace {
    pub(crate) fn provide(request: &RequestNamespace, accounts: Vec<AccountId>) -> Self {
        Self {
            chains: request.chains.clone(),
            methods: request.methods.clone(),
            events: request.events.clone(),
            accounts,
        }
    }
}

/// Namespaces requested by an origin.
pub type RequestedNamespaces = BTreeMap<NamespaceId, RequestNamespace>;

/// Namespaces a session provides.
pub type ProvidedNamespaces = BTreeMap<NamespaceId, SessionNamespace>;

/// The negotiated binding of an origin's namespaces to plugins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// The origin owning the session.
    pub origin: Origin,
    /// What the origin asked for.
    pub requested_namespaces: RequestedNamespaces,
    /// What it got.
    pub provided_namespaces: ProvidedNamespaces,
    /// The plugin servicing each provided namespace.
    pub handling_plugins: BTreeMap<NamespaceId, PluginId>,
}

impl Session {
    /// Every distinct plugin the session binds.
    #[must_use]
    pub fn bound_plugins(&self) -> BTreeSet<PluginId> {
        self.handling_plugins.values().cloned().collect()
    }

    /// Whether `plugin_id` services any namespace of the session.
    #[must_use]
    pub fn binds(&self, plugin_id: &PluginId) -> bool {
        self.handling_plugins.values().any(|p| p == plugin_id)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_request_namespace_deserializes_without_methods() {
        let ns: RequestNamespace = serde_json::from_value(json!({"chains": ["eip155:1"]})).unwrap();
        assert_eq!(ns.chains, vec![ChainId::new("eip155:1").unwrap()]);
        assert!(ns.methods.is_empty());
    }

    #[test]
    fn test_request_namespace_rejects_bad_chain() {
        let parsed = serde_json::from_value::<RequestNamespace>(json!({"chains": ["eip155"]}));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_session_bound_plugins_deduplicates() {
        let a = PluginId::from_static("npm:a");
        let session = Session {
            origin: Origin::new("https://dapp.example").unwrap(),
            requested_namespaces: BTreeMap::new(),
            provided_namespaces: BTreeMap::new(),
            handling_plugins: BTreeMap::from([
                (NamespaceId::new("eip155").unwrap(), a.clone()),
                (NamespaceId::new("bip122").unwrap(), a.clone()),
            ]),
        };
        assert_eq!(session.bound_plugins().len(), 1);
        assert!(session.binds(&a));
        assert!(!session.binds(&PluginId::from_static("npm:b")));

        let encoded = serde_json::to_value(&session).unwrap();
        assert_eq!(encoded["handlingPlugins"]["eip155"], "npm:a");
    }
}
