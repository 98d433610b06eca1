//! Enclave Multichain - Session negotiation between origins and keyring plugins.
//!
//! An origin asks for a set of namespaces (protocol families such as
//! `eip155`), each with the chains, methods and events it wants. The
//! [`SessionNegotiator`] finds installed plugins whose keyring grant declares
//! those namespaces, asks them for accounts, lets a human choose when the
//! choice is ambiguous, and stores the resulting [`Session`]. Afterwards the
//! origin's requests are routed to the plugin bound to each chain's namespace.
//!
//! Grants, approvals and the installed-plugin list belong to the host and are
//! reached through [`PermissionController`] and [`PluginDirectory`].
//!
//! Every plugin a session binds holds an active reference on its runtime for
//! as long as the session exists.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod collaborator;
mod error;
pub mod keyring;
mod negotiator;
mod store;
mod types;

pub use collaborator::{
    ApprovalRequest, GrantRequest, InstalledPlugin, PermissionController, PluginDirectory,
    SNAP_IDS, WALLET_SNAP,
};
pub use error::{MultichainError, MultichainResult};
pub use negotiator::{MULTICHAIN_CONNECT, NegotiatorOptions, SessionNegotiator};
pub use store::SessionStore;
pub use types::{
    ProvidedNamespaces, RequestNamespace, RequestedNamespaces, Session, SessionNamespace,
};
