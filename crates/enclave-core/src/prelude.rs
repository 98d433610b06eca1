//! Prelude module - commonly used types for convenient import.
//!
//! Use `use enclave_core::prelude::*;` to import all essential types.

// Errors
pub use crate::{CoreError, CoreResult};

// Identifiers
pub use crate::{AccountId, ChainId, NamespaceId, Origin, PluginId};

// JSON-RPC
pub use crate::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestId};

// Permissions
pub use crate::{Caveat, Grant, HandlerType, PermissionSet};
