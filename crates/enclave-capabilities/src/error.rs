//! Capability error types.

use thiserror::Error;

/// Errors from capability registration, building and caveat validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    /// No capability is registered under this name.
    #[error("unknown capability: {0}")]
    UnknownCapability(String),

    /// A capability with this name is already registered.
    #[error("capability already registered: {0}")]
    AlreadyRegistered(String),

    /// The grant carries a caveat the capability does not accept.
    #[error("caveat '{caveat}' is not allowed for capability '{capability}'")]
    DisallowedCaveat {
        /// Capability the grant was issued for.
        capability: String,
        /// The offending caveat type.
        caveat: String,
    },

    /// A caveat value has the wrong shape.
    #[error("invalid '{caveat}' caveat: {message}")]
    InvalidCaveat {
        /// The caveat type.
        caveat: String,
        /// What is wrong with it.
        message: String,
    },
}

/// Result type for capability operations.
pub type CapabilityResult<T> = Result<T, CapabilityError>;
