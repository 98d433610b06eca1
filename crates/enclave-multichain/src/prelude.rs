//! Prelude module - commonly used types for convenient import.
//!
//! Use `use enclave_multichain::prelude::*;` to import all essential types.

// Errors
pub use crate::{MultichainError, MultichainResult};

// Negotiator
pub use crate::{NegotiatorOptions, SessionNegotiator, SessionStore};

// Sessions
pub use crate::{ProvidedNamespaces, RequestNamespace, RequestedNamespaces, Session, SessionNamespace};

// Collaborators
pub use crate::{InstalledPlugin, PermissionController, PluginDirectory};
