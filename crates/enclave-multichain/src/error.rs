//! Session negotiation errors.

use enclave_core::{ChainId, CoreError, NamespaceId, Origin, PluginId};
use enclave_executor::ExecutorError;
use thiserror::Error;

/// Errors surfaced by the session negotiator.
#[derive(Debug, Error)]
pub enum MultichainError {
    /// The origin has no session.
    #[error("no session for origin {0}")]
    NoSession(Origin),

    /// The chain is not part of the session.
    #[error("chain {0} is not supported by this session")]
    UnsupportedChain(ChainId),

    /// The method is not allowed for the chain's namespace.
    #[error("method {method} is not supported for namespace {namespace}")]
    UnsupportedMethod {
        /// Namespace the call resolved to.
        namespace: NamespaceId,
        /// The rejected method.
        method: String,
    },

    /// The origin no longer holds a grant for the bound plugin.
    #[error("origin {origin} no longer has permission to use {plugin_id}")]
    PermissionRevoked {
        /// The calling origin.
        origin: Origin,
        /// The plugin bound to the namespace.
        plugin_id: PluginId,
    },

    /// No plugin could service any requested namespace.
    #[error("no installed plugin can service the requested namespaces")]
    NoMatch,

    /// A collaborator (permission controller, plugin directory) failed.
    #[error("collaborator error: {0}")]
    Collaborator(String),

    /// The execution supervisor refused or the plugin returned an error.
    #[error(transparent)]
    Execution(#[from] ExecutorError),

    /// An identifier failed to parse.
    #[error(transparent)]
    InvalidIdentifier(#[from] CoreError),
}

/// Result type for session negotiation.
pub type MultichainResult<T> = Result<T, MultichainError>;
