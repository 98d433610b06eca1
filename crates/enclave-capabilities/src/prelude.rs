//! Prelude module - commonly used types for convenient import.
//!
//! Use `use enclave_capabilities::prelude::*;` to import all essential types.

// Errors
pub use crate::{CapabilityError, CapabilityResult};

// Registry and specs
pub use crate::{
    BuilderOptions, CapabilityKind, CapabilityRegistry, CapabilitySpec, EndowmentOptions,
    PermissionType, SubjectType,
};

// Endowments
pub use crate::{DEFAULT_ENDOWMENTS, compute_endowments};
