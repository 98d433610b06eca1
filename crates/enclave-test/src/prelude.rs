//! Prelude module - commonly used types for convenient import.
//!
//! Use `use enclave_test::prelude::*;` to import all essential types.

// Host
pub use crate::{TestHost, init_test_logging};

// Mocks
pub use crate::{MockPermissionController, MockPluginDirectory, MockRuntimeBackend, RecordedCall};

// Fixtures
pub use crate::{chain, keyring_declaration, keyring_handler, namespace, origin, request_namespaces, test_origin};
