//! Host-side handling of messages a plugin sends on its own initiative.

use async_trait::async_trait;
use enclave_core::{JsonRpcError, JsonRpcNotification, JsonRpcRequest, PluginId};
use serde_json::Value;

/// A message originated by a plugin rather than a reply to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    /// A call expecting a reply.
    Request(JsonRpcRequest),
    /// A fire-and-forget message.
    Notification(JsonRpcNotification),
}

/// Receives plugin-originated messages, e.g. to route them into the host's
/// JSON-RPC middleware.
#[async_trait]
pub trait MessageRelay: Send + Sync {
    /// Handle one message from `plugin_id`.
    ///
    /// For requests the returned value or error is sent back to the plugin;
    /// for notifications it is discarded.
    async fn relay(&self, plugin_id: &PluginId, message: RelayMessage) -> Result<Value, JsonRpcError>;
}
