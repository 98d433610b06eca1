#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
//! Layered configuration for the Enclave plugin host.
//!
//! # Usage
//!
//! ```rust,no_run
//! use enclave_config::Config;
//!
//! // defaults -> ~/.enclave/config.toml -> ENCLAVE_* env fallbacks
//! let config = Config::load().unwrap();
//! println!("log level: {}", config.logging.level);
//! ```
//!
//! # Configuration Precedence
//!
//! From highest to lowest priority:
//!
//! 1. **User** (`~/.enclave/config.toml`, or an explicit path)
//! 2. **Environment variables** (`ENCLAVE_*`), fallback only
//! 3. **Embedded defaults** (`defaults.toml` compiled into the binary)
//!
//! This crate depends on no other enclave crate. The executor, negotiator
//! and telemetry crates convert from its sections at their own boundary.

/// Configuration error types.
pub mod error;
/// Configuration file discovery and loading.
pub mod loader;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use types::*;

impl Config {
    /// Load configuration from defaults, the user file and the environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the user file is malformed or the final
    /// configuration fails validation.
    pub fn load() -> ConfigResult<Self> {
        loader::load(None)
    }

    /// Load configuration with an explicit user file in place of
    /// `~/.enclave/config.toml`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file is malformed or the final
    /// configuration fails validation. A missing file is not an error.
    pub fn load_from(path: &std::path::Path) -> ConfigResult<Self> {
        loader::load(Some(path))
    }
}
