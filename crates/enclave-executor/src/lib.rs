//! Enclave Executor - Supervises isolated plugin runtimes.
//!
//! This crate provides:
//! - [`ExecutionSupervisor`]: starts, addresses and tears down one runtime per
//!   plugin, tracks active references and detects crashes
//! - [`RuntimeBackend`]: the seam behind which a runtime is actually created
//! - [`ProcessBackend`]: a backend running each plugin in a child process
//!   speaking newline-delimited JSON over stdio
//! - [`MessageRelay`]: where messages a plugin sends on its own initiative go
//!
//! Runtimes are untrusted. Everything they send is validated before it is
//! acted on, and a runtime that vanishes fails every in-flight call with
//! [`ExecutorError::PluginCrashed`] and is announced on the event bus.
//!
//! # Example
//!
//! ```rust,no_run
//! use enclave_core::{HandlerType, JsonRpcRequest, Origin, PluginId};
//! use enclave_executor::{ExecutionSupervisor, RpcCall};
//!
//! # async fn example(supervisor: ExecutionSupervisor) -> Result<(), Box<dyn std::error::Error>> {
//! let plugin = PluginId::new("npm:wallet")?;
//! supervisor.execute_plugin(&plugin, "/* bundle */", &["console".to_string()]).await?;
//!
//! let call = RpcCall::new(
//!     Origin::new("https://dapp.example")?,
//!     HandlerType::OnRpcRequest,
//!     JsonRpcRequest::new(1_i64, "hello", None),
//! );
//! let answer = supervisor.handle_rpc_request(&plugin, call).await?;
//! # let _ = answer;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod backend;
mod envelope;
mod error;
mod process;
mod relay;
mod runtime;
mod supervisor;

pub use backend::{RuntimeBackend, RuntimeChannel, RuntimeEnd};
pub use envelope::{EXECUTE_SNAP, SNAP_RPC, unwrap_response};
pub use error::{ExecutorError, ExecutorResult};
pub use process::{ProcessBackend, ProcessBackendConfig};
pub use relay::{MessageRelay, RelayMessage};
pub use runtime::PluginState;
pub use supervisor::{ExecutionSupervisor, RpcCall};
