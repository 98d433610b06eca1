//! Prelude module - commonly used types for convenient import.
//!
//! Use `use enclave_executor::prelude::*;` to import all essential types.

// Errors
pub use crate::{ExecutorError, ExecutorResult};

// Supervisor
pub use crate::{ExecutionSupervisor, PluginState, RpcCall};

// Backends
pub use crate::{ProcessBackend, ProcessBackendConfig, RuntimeBackend, RuntimeChannel};

// Relay
pub use crate::{MessageRelay, RelayMessage};
