//! Capability specifications and the options used to build them.

use enclave_core::PluginId;
use serde::{Deserialize, Serialize};

use crate::kind::CapabilityKind;

/// How a granted capability takes effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionType {
    /// Primitives injected into the runtime, or a pure feature flag.
    Endowment,
    /// A host method the plugin may call.
    RestrictedMethod,
}

/// Who a capability may be granted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubjectType {
    /// An installed plugin.
    Plugin,
    /// A website origin.
    Website,
}

/// Options accepted when building a [`CapabilitySpec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderOptions {
    /// Subjects the built capability may be granted to.
    pub subject_types: Vec<SubjectType>,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            subject_types: vec![SubjectType::Plugin],
        }
    }
}

/// Options passed to an endowment getter.
///
/// None of the built-in kinds read these; they exist so a getter keeps one
/// signature whether or not it needs context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndowmentOptions {
    /// The plugin the endowments are being computed for, when known.
    pub plugin_id: Option<PluginId>,
}

/// An immutable capability specification.
///
/// Built by [`CapabilityRegistry::build`](crate::CapabilityRegistry::build).
/// Two builds of the same name with equal options compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitySpec {
    /// Registered name, e.g. `endowment:network-access`.
    pub name: String,
    /// The kind backing this spec.
    #[serde(skip)]
    pub kind: CapabilityKind,
    /// Endowment or restricted method.
    pub permission_type: PermissionType,
    /// Caveat types a grant may carry; `None` when caveats are not allowed.
    pub allowed_caveats: Option<Vec<String>>,
    /// Subjects this capability may be granted to.
    pub subject_types: Vec<SubjectType>,
}

impl CapabilitySpec {
    pub(crate) fn from_kind(name: &str, kind: CapabilityKind, options: &BuilderOptions) -> Self {
        Self {
            name: name.to_string(),
            kind,
            permission_type: kind.permission_type(),
            allowed_caveats: kind
                .allowed_caveats()
                .map(|caveats| caveats.iter().map(ToString::to_string).collect()),
            subject_types: options.subject_types.clone(),
        }
    }

    /// Host primitives a runtime receives when this capability is granted.
    ///
    /// See [`CapabilityKind::endowments`].
    #[must_use]
    pub fn endowments(&self, options: &EndowmentOptions) -> Option<Vec<&'static str>> {
        self.kind.endowments(options)
    }

    /// Whether a grant of this capability may carry `caveat_type`.
    #[must_use]
    pub fn allows_caveat(&self, caveat_type: &str) -> bool {
        self.allowed_caveats
            .as_ref()
            .is_some_and(|allowed| allowed.iter().any(|c| c == caveat_type))
    }
}
