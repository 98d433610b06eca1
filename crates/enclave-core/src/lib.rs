//! Enclave Core - Foundation types for the Enclave plugin host.
//!
//! This crate provides:
//! - Stable identifiers for plugins ([`PluginId`]) and callers ([`Origin`])
//! - Strict CAIP-style namespace, chain and account identifiers
//! - JSON-RPC 2.0 request/response shapes exchanged with plugin runtimes
//! - Permission grants and caveats as stored by the permission collaborator
//! - The handler entry points a plugin can expose
//!
//! Nothing in here performs I/O; every type is plain data that the
//! capability, executor and multichain crates build on.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod caip;
pub mod error;
pub mod handler;
pub mod id;
pub mod jsonrpc;
pub mod permission;

pub use caip::{AccountId, ChainId, NamespaceId};
pub use error::{CoreError, CoreResult};
pub use handler::HandlerType;
pub use id::{Origin, PluginId};
pub use jsonrpc::{
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId, error_codes,
};
pub use permission::{Caveat, Grant, PermissionSet};
