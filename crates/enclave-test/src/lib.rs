//! Enclave Test - Shared test utilities for the Enclave plugin host.
//!
//! This crate provides mock collaborators and a wired-up [`TestHost`] for
//! integration tests in the other crates' `tests/` directories.
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! enclave-test.workspace = true
//! ```
//!
//! Then use in your tests:
//!
//! ```rust,ignore
//! use enclave_test::{TestHost, keyring_declaration, request_namespaces, test_origin};
//!
//! #[tokio::test]
//! async fn test_connect() {
//!     let host = TestHost::new();
//!     host.install_keyring(
//!         "npm:keyring",
//!         keyring_declaration(&[("eip155", &["eip155:1"])]),
//!         &["eip155:1:0xabc"],
//!     )
//!     .await
//!     .unwrap();
//!
//!     let provided = host
//!         .negotiator
//!         .connect(&test_origin(), request_namespaces(&[("eip155", &["eip155:1"], &[])]))
//!         .await
//!         .unwrap();
//!     assert_eq!(provided.len(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod fixtures;
pub mod harness;
pub mod mocks;

pub use fixtures::*;
pub use harness::*;
pub use mocks::*;
