//! The runtime backend contract.

use async_trait::async_trait;
use enclave_core::PluginId;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::ExecutorResult;

/// The bidirectional message channel to one runtime instance.
///
/// Dropping `outbound` asks the runtime to shut down. The backend closes
/// `inbound` when the runtime is gone, for whatever reason.
#[derive(Debug)]
pub struct RuntimeChannel {
    /// Messages to the runtime.
    pub outbound: mpsc::Sender<Value>,
    /// Messages from the runtime.
    pub inbound: mpsc::Receiver<Value>,
}

impl RuntimeChannel {
    /// Create a connected pair: the channel handed to the supervisor, and the
    /// runtime's end of it.
    #[must_use]
    pub fn pair(capacity: usize) -> (Self, RuntimeEnd) {
        let capacity = capacity.max(1);
        let (out_tx, out_rx) = mpsc::channel(capacity);
        let (in_tx, in_rx) = mpsc::channel(capacity);
        (
            Self {
                outbound: out_tx,
                inbound: in_rx,
            },
            RuntimeEnd {
                from_host: out_rx,
                to_host: in_tx,
            },
        )
    }
}

/// The runtime's side of a [`RuntimeChannel`].
#[derive(Debug)]
pub struct RuntimeEnd {
    /// Messages sent by the host.
    pub from_host: mpsc::Receiver<Value>,
    /// Messages to the host. Dropping it signals the runtime has exited.
    pub to_host: mpsc::Sender<Value>,
}

/// Creates isolated runtimes.
///
/// How a runtime executes plugin code is the backend's business; the
/// supervisor only sees the JSON message channel.
#[async_trait]
pub trait RuntimeBackend: Send + Sync {
    /// Start a fresh runtime for `plugin_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::Backend`](crate::ExecutorError::Backend) if the
    /// runtime cannot be created.
    async fn spawn(&self, plugin_id: &PluginId) -> ExecutorResult<RuntimeChannel>;
}
