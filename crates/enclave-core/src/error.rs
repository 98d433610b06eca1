//! Identifier and shape validation errors.

use thiserror::Error;

/// Errors raised while constructing or parsing core identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The plugin id is empty or contains characters outside the allowed set.
    #[error("invalid plugin id: {0}")]
    InvalidPluginId(String),

    /// The origin is empty or contains whitespace.
    #[error("invalid origin: {0}")]
    InvalidOrigin(String),

    /// A namespace identifier does not match `[-a-z0-9]{3,8}`.
    #[error("invalid namespace id: {0}")]
    InvalidNamespace(String),

    /// A chain identifier is not of the form `namespace:reference`.
    #[error("invalid chain id: {0}")]
    InvalidChainId(String),

    /// An account identifier is not of the form `namespace:reference:address`.
    #[error("invalid account id: {0}")]
    InvalidAccountId(String),

    /// The handler name does not correspond to a known plugin entry point.
    #[error("unknown handler: {0}")]
    UnknownHandler(String),
}

/// Result type for core identifier operations.
pub type CoreResult<T> = Result<T, CoreError>;
