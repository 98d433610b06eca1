//! Contracts of the host components the negotiator relies on.
//!
//! Grants, approvals and the installed-plugin list are owned elsewhere. The
//! negotiator only calls through these traits and never persists grants
//! itself.

use std::collections::BTreeSet;

use async_trait::async_trait;
use enclave_core::{Caveat, Grant, Origin, PermissionSet, PluginId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::MultichainResult;

/// Permission granting an origin access to specific plugins.
pub const WALLET_SNAP: &str = "wallet_snap";

/// Caveat of [`WALLET_SNAP`] listing the plugins the origin may reach.
pub const SNAP_IDS: &str = "snapIds";

/// Build a [`WALLET_SNAP`] grant covering `plugins`.
#[must_use]
pub fn wallet_snap_grant<'a>(plugins: impl IntoIterator<Item = &'a PluginId>) -> Grant {
    let ids: Map<String, Value> = plugins
        .into_iter()
        .map(|id| (id.to_string(), Value::Object(Map::new())))
        .collect();
    Grant::new(WALLET_SNAP).with_caveat(Caveat::new(SNAP_IDS, Value::Object(ids)))
}

/// Plugins named by a [`WALLET_SNAP`] grant. Malformed entries are skipped.
#[must_use]
pub fn wallet_snap_plugins(grant: &Grant) -> Vec<PluginId> {
    grant
        .caveat(SNAP_IDS)
        .and_then(|c| c.value.as_object())
        .map(|ids| ids.keys().filter_map(|k| PluginId::new(k.as_str()).ok()).collect())
        .unwrap_or_default()
}

/// A request to grant permissions to a subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantRequest {
    /// The permissions to grant, by capability name.
    pub approved_permissions: PermissionSet,
    /// Who receives them.
    pub subject: Origin,
    /// Merge with the subject's existing grants instead of replacing them.
    pub preserve_existing: bool,
}

/// A request for a human decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    /// The origin the decision is made for.
    pub origin: Origin,
    /// Unique request id.
    pub id: String,
    /// Approval type, e.g. `multichain_connect`.
    #[serde(rename = "type")]
    pub approval_type: String,
    /// Type-specific payload shown to the human.
    pub request_data: Value,
}

/// An installed plugin as listed by the [`PluginDirectory`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPlugin {
    /// Plugin id.
    pub id: PluginId,
    /// Whether the user has enabled it.
    pub enabled: bool,
    /// Whether it was blocked by the host.
    pub blocked: bool,
}

impl InstalledPlugin {
    /// An enabled, unblocked plugin.
    #[must_use]
    pub fn new(id: PluginId) -> Self {
        Self {
            id,
            enabled: true,
            blocked: false,
        }
    }

    /// Whether the plugin may be run at all.
    #[must_use]
    pub fn is_runnable(&self) -> bool {
        self.enabled && !self.blocked
    }
}

/// The host's permission and approval store.
#[async_trait]
pub trait PermissionController: Send + Sync {
    /// Grants held by `subject` (an origin or a plugin id), if any.
    async fn get_permissions(&self, subject: &str) -> MultichainResult<Option<PermissionSet>>;

    /// Whether `origin` holds a grant naming `plugin_id`.
    async fn has_permission(&self, origin: &Origin, plugin_id: &PluginId) -> MultichainResult<bool>;

    /// Grant permissions.
    async fn grant_permissions(&self, request: GrantRequest) -> MultichainResult<()>;

    /// Ask a human and wait for the answer.
    async fn add_approval_request(
        &self,
        request: ApprovalRequest,
        should_show_ui: bool,
    ) -> MultichainResult<Value>;
}

/// The list of installed plugins.
#[async_trait]
pub trait PluginDirectory: Send + Sync {
    /// All installed plugins, in installation order.
    async fn list_plugins(&self) -> MultichainResult<Vec<InstalledPlugin>>;
}

/// Merge `incoming` into `existing` the way a permission store honouring
/// `preserve_existing` does: [`WALLET_SNAP`] plugin lists are unioned, other
/// grants are replaced.
pub fn merge_permissions(existing: &mut PermissionSet, incoming: PermissionSet) {
    for (name, grant) in incoming {
        if name == WALLET_SNAP
            && let Some(current) = existing.get(&name)
        {
            let merged: BTreeSet<PluginId> = wallet_snap_plugins(current)
                .into_iter()
                .chain(wallet_snap_plugins(&grant))
                .collect();
            existing.insert(name, wallet_snap_grant(&merged));
        } else {
            existing.insert(name, grant);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_snap_grant_round_trip() {
        let a = PluginId::from_static("npm:a");
        let b = PluginId::from_static("npm:b");
        let grant = wallet_snap_grant([&a, &b]);
        assert_eq!(grant.parent_capability, WALLET_SNAP);
        assert_eq!(wallet_snap_plugins(&grant), vec![a, b]);
    }

    #[test]
    fn test_merge_unions_wallet_snap() {
        let a = PluginId::from_static("npm:a");
        let b = PluginId::from_static("npm:b");
        let mut existing = PermissionSet::from([(WALLET_SNAP.to_string(), wallet_snap_grant([&a]))]);
        merge_permissions(
            &mut existing,
            PermissionSet::from([(WALLET_SNAP.to_string(), wallet_snap_grant([&b]))]),
        );
        assert_eq!(wallet_snap_plugins(&existing[WALLET_SNAP]), vec![a, b]);
    }

    #[test]
    fn test_runnable() {
        let mut plugin = InstalledPlugin::new(PluginId::from_static("npm:a"));
        assert!(plugin.is_runnable());
        plugin.blocked = true;
        assert!(!plugin.is_runnable());
    }
}
