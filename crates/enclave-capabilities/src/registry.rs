//! The capability registry.

use std::collections::BTreeMap;
use std::fmt;

use enclave_core::Grant;
use tracing::debug;

use crate::caveat;
use crate::error::{CapabilityError, CapabilityResult};
use crate::kind::CapabilityKind;
use crate::spec::{BuilderOptions, CapabilitySpec};

/// A table of named capabilities.
///
/// Built once at startup and shared behind an `Arc`; nothing in the host
/// reaches it through a global.
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    entries: BTreeMap<String, CapabilityKind>,
}

impl CapabilityRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every built-in kind under its default name.
    #[must_use]
    pub fn with_defaults() -> Self {
        let entries = CapabilityKind::ALL
            .into_iter()
            .map(|kind| (kind.default_name().to_string(), kind))
            .collect();
        Self { entries }
    }

    /// Register `kind` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::AlreadyRegistered`] if `name` is taken.
    pub fn register(&mut self, name: impl Into<String>, kind: CapabilityKind) -> CapabilityResult<()> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(CapabilityError::AlreadyRegistered(name));
        }
        debug!(capability = %name, kind = %kind, "Registered capability");
        self.entries.insert(name, kind);
        Ok(())
    }

    /// Build the specification registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::UnknownCapability`] if nothing is registered
    /// under `name`.
    pub fn build(&self, name: &str, options: &BuilderOptions) -> CapabilityResult<CapabilitySpec> {
        let kind = self
            .kind(name)
            .ok_or_else(|| CapabilityError::UnknownCapability(name.to_string()))?;
        Ok(CapabilitySpec::from_kind(name, kind, options))
    }

    /// The kind registered under `name`.
    #[must_use]
    pub fn kind(&self, name: &str) -> Option<CapabilityKind> {
        self.entries.get(name).copied()
    }

    /// Whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of registered capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check a grant against the capability it names.
    ///
    /// # Errors
    ///
    /// - [`CapabilityError::UnknownCapability`] if the grant's capability is
    ///   not registered
    /// - [`CapabilityError::DisallowedCaveat`] / [`CapabilityError::InvalidCaveat`]
    ///   as for [`caveat::validate_grant`]
    pub fn validate_grant(&self, grant: &Grant) -> CapabilityResult<()> {
        let spec = self.build(&grant.parent_capability, &BuilderOptions::default())?;
        caveat::validate_grant(&spec, grant)
    }
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &self.entries.len())
            .finish_non_exhaustive()
    }
}
