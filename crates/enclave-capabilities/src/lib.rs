//! Enclave Capabilities - what a plugin may request and what it receives.
//!
//! This crate provides:
//! - [`CapabilityKind`]: every built-in capability as a tagged enum with a
//!   pure endowment dispatch
//! - [`CapabilitySpec`]: the immutable, comparable specification built from a
//!   kind and [`BuilderOptions`]
//! - [`CapabilityRegistry`]: an explicitly constructed table of named
//!   capabilities, shared by reference rather than living in a global
//! - [`compute_endowments`]: the exact host primitives a plugin's runtime
//!   receives for a set of grants
//! - Caveat validation and typed caveat accessors
//!
//! # Example
//!
//! ```
//! use enclave_capabilities::{BuilderOptions, CapabilityRegistry, EndowmentOptions};
//!
//! let registry = CapabilityRegistry::with_defaults();
//! let spec = registry
//!     .build("endowment:network-access", &BuilderOptions::default())
//!     .unwrap();
//!
//! assert_eq!(
//!     spec.endowments(&EndowmentOptions::default()),
//!     Some(vec!["fetch", "Request", "Headers", "Response"])
//! );
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod caveat;
mod endowments;
mod error;
mod kind;
mod registry;
mod spec;

pub use endowments::{DEFAULT_ENDOWMENTS, compute_endowments};
pub use error::{CapabilityError, CapabilityResult};
pub use kind::CapabilityKind;
pub use registry::CapabilityRegistry;
pub use spec::{BuilderOptions, CapabilitySpec, EndowmentOptions, PermissionType, SubjectType};
