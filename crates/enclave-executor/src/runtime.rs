//! Per-plugin runtime bookkeeping.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use enclave_core::{JsonRpcRequest, PluginId, RequestId};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::envelope::unwrap_response;
use crate::error::{ExecutorError, ExecutorResult};

/// Lifecycle state of a plugin's runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginState {
    /// No runtime exists.
    Unloaded,
    /// A runtime is being created or has not yet acknowledged its code.
    Starting,
    /// The runtime is serving requests.
    Running,
    /// The runtime is being torn down.
    Terminating,
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unloaded => "unloaded",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Terminating => "terminating",
        })
    }
}

type PendingReply = oneshot::Sender<ExecutorResult<Value>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The supervisor's live binding of a plugin to one runtime instance.
///
/// None of the locks in here are held across an `.await`.
pub(crate) struct RuntimeHandle {
    plugin_id: PluginId,
    generation: u64,
    state: Mutex<PluginState>,
    outbound: Mutex<Option<mpsc::Sender<Value>>>,
    pending: Mutex<HashMap<RequestId, PendingReply>>,
    references: AtomicUsize,
    next_id: AtomicI64,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl RuntimeHandle {
    pub(crate) fn new(plugin_id: PluginId, generation: u64, outbound: mpsc::Sender<Value>) -> Self {
        Self {
            plugin_id,
            generation,
            state: Mutex::new(PluginState::Starting),
            outbound: Mutex::new(Some(outbound)),
            pending: Mutex::new(HashMap::new()),
            references: AtomicUsize::new(0),
            next_id: AtomicI64::new(1),
            reader: Mutex::new(None),
        }
    }

    pub(crate) fn plugin_id(&self) -> &PluginId {
        &self.plugin_id
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn state(&self) -> PluginState {
        *lock(&self.state)
    }

    /// Starting → Running. Fails if the runtime was torn down meanwhile.
    pub(crate) fn mark_running(&self) -> bool {
        let mut state = lock(&self.state);
        if *state == PluginState::Starting {
            *state = PluginState::Running;
            true
        } else {
            false
        }
    }

    pub(crate) fn attach_reader(&self, reader: JoinHandle<()>) {
        *lock(&self.reader) = Some(reader);
    }

    // -----------------------------------------------------------------------
    // Active references
    // -----------------------------------------------------------------------

    pub(crate) fn references(&self) -> usize {
        self.references.load(Ordering::Acquire)
    }

    pub(crate) fn increment(&self) -> usize {
        let mut current = self.references.load(Ordering::Acquire);
        loop {
            let next = current.saturating_add(1);
            match self.references.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    /// Returns the new count, or `None` if the count was already zero.
    pub(crate) fn decrement(&self) -> Option<usize> {
        let mut current = self.references.load(Ordering::Acquire);
        loop {
            let next = current.checked_sub(1)?;
            match self.references.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(next),
                Err(actual) => current = actual,
            }
        }
    }

    // -----------------------------------------------------------------------
    // Messaging
    // -----------------------------------------------------------------------

    /// Send one message to the runtime.
    pub(crate) async fn send(&self, message: Value) -> ExecutorResult<()> {
        let sender = lock(&self.outbound)
            .clone()
            .ok_or_else(|| ExecutorError::PluginNotRunning(self.plugin_id.clone()))?;
        sender
            .send(message)
            .await
            .map_err(|_| ExecutorError::Transport("runtime channel closed".to_string()))
    }

    /// Issue a request and wait for the unwrapped reply.
    ///
    /// Dropping the returned future removes the pending entry; the runtime
    /// is not told and may still answer, which is then discarded.
    pub(crate) async fn call(&self, method: &str, params: Value) -> ExecutorResult<Value> {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id.clone(), tx);
        let _pending = PendingGuard {
            pending: &self.pending,
            id: id.clone(),
        };

        let request = JsonRpcRequest::new(id, method, Some(params));
        let message =
            serde_json::to_value(&request).map_err(|e| ExecutorError::Transport(e.to_string()))?;
        self.send(message).await?;

        let reply = rx
            .await
            .map_err(|_| ExecutorError::PluginNotRunning(self.plugin_id.clone()))??;
        unwrap_response(reply)
    }

    /// Route a reply to its waiter. Returns `false` if nobody is waiting.
    pub(crate) fn complete(&self, id: &RequestId, message: Value) -> bool {
        let waiter = lock(&self.pending).remove(id);
        match waiter {
            Some(tx) => {
                // The caller may have given up; that is fine.
                let _ = tx.send(Ok(message));
                true
            },
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Mark the runtime terminating, drop its outbound channel, zero its
    /// references and fail every in-flight call with `error`.
    pub(crate) fn release(&self, error: &ExecutorError) {
        *lock(&self.state) = PluginState::Terminating;
        lock(&self.outbound).take();
        self.references.store(0, Ordering::Release);

        let drained: Vec<PendingReply> = lock(&self.pending).drain().map(|(_, tx)| tx).collect();
        for tx in drained {
            let _ = tx.send(Err(error.clone()));
        }
    }

    /// [`release`](Self::release) plus stopping the reader task, so the
    /// channel closing afterwards is not mistaken for a crash.
    pub(crate) fn shutdown(&self, error: &ExecutorError) {
        self.release(error);
        if let Some(reader) = lock(&self.reader).take() {
            reader.abort();
        }
    }
}

impl fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("plugin_id", &self.plugin_id)
            .field("generation", &self.generation)
            .field("state", &self.state())
            .field("references", &self.references())
            .finish_non_exhaustive()
    }
}

struct PendingGuard<'a> {
    pending: &'a Mutex<HashMap<RequestId, PendingReply>>,
    id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(&self.id);
    }
}
