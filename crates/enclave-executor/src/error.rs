//! Executor error types.

use enclave_core::{JsonRpcError, PluginId};
use thiserror::Error;

/// Errors surfaced by the execution supervisor.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutorError {
    /// The plugin already has a runtime that is starting or running.
    #[error("plugin already running: {0}")]
    AlreadyRunning(PluginId),

    /// The plugin has no running runtime.
    #[error("plugin not running: {0}")]
    PluginNotRunning(PluginId),

    /// The plugin's runtime went away without being asked to.
    #[error("plugin {plugin_id} crashed: {reason}")]
    PluginCrashed {
        /// The plugin whose runtime died.
        plugin_id: PluginId,
        /// What the supervisor observed.
        reason: String,
    },

    /// The plugin answered with a JSON-RPC error.
    #[error("plugin error: {0}")]
    Plugin(JsonRpcError),

    /// The runtime backend could not create or drive a runtime.
    #[error("runtime backend error: {0}")]
    Backend(String),

    /// The message channel to the runtime failed.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Result type for executor operations.
pub type ExecutorResult<T> = Result<T, ExecutorError>;
