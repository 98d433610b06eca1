//! Enclave Telemetry - Logging for the Enclave plugin host.
//!
//! This crate provides:
//! - Configurable logging setup with multiple formats
//! - `RUST_LOG` support on top of the configured level
//! - With the `config` feature, conversion from the config crate's logging
//!   section
//!
//! # Example
//!
//! ```rust,no_run
//! use enclave_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), enclave_telemetry::TelemetryError> {
//! let config = LogConfig::new("debug")
//!     .with_format(LogFormat::Pretty)
//!     .with_directive("enclave_executor=trace");
//!
//! setup_logging(&config)?;
//! tracing::info!("logging ready");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging};
