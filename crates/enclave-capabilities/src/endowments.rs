//! Endowment computation for a plugin's grants.

use enclave_core::PermissionSet;
use tracing::{debug, warn};

use crate::registry::CapabilityRegistry;
use crate::spec::{EndowmentOptions, PermissionType};

/// Primitives every runtime receives regardless of grants.
pub const DEFAULT_ENDOWMENTS: &[&str] = &[
    "atob",
    "btoa",
    "BigInt",
    "console",
    "crypto",
    "Date",
    "Math",
    "setTimeout",
    "clearTimeout",
    "setInterval",
    "clearInterval",
    "SubtleCrypto",
    "TextDecoder",
    "TextEncoder",
    "URL",
    "Int8Array",
    "Uint8Array",
    "Uint8ClampedArray",
    "Int16Array",
    "Uint16Array",
    "Int32Array",
    "Uint32Array",
    "Float32Array",
    "Float64Array",
    "BigInt64Array",
    "BigUint64Array",
    "DataView",
    "ArrayBuffer",
    "AbortController",
];

/// The exact set of host primitives a runtime receives for `permissions`.
///
/// The defaults come first, followed by the endowments of each granted
/// endowment capability in permission-name order, with duplicates dropped
/// at their first occurrence. Restricted methods contribute nothing. Grants
/// naming a capability the registry does not know are skipped.
#[must_use]
pub fn compute_endowments(
    registry: &CapabilityRegistry,
    permissions: &PermissionSet,
    options: &EndowmentOptions,
) -> Vec<String> {
    let mut out: Vec<String> = DEFAULT_ENDOWMENTS.iter().map(ToString::to_string).collect();

    for name in permissions.keys() {
        let Some(kind) = registry.kind(name) else {
            warn!(capability = %name, "Ignoring grant for unknown capability");
            continue;
        };
        if kind.permission_type() != PermissionType::Endowment {
            continue;
        }
        for primitive in kind.endowments(options).unwrap_or_default() {
            if !out.iter().any(|e| e == primitive) {
                out.push(primitive.to_string());
            }
        }
    }

    debug!(
        plugin_id = ?options.plugin_id.as_ref().map(ToString::to_string),
        count = out.len(),
        "Computed endowments"
    );
    out
}

#[cfg(test)]
mod tests {
    use enclave_core::Grant;

    use super::*;

    fn grants(names: &[&str]) -> PermissionSet {
        names
            .iter()
            .map(|n| ((*n).to_string(), Grant::new(*n)))
            .collect()
    }

    #[test]
    fn test_no_grants_yields_defaults() {
        let registry = CapabilityRegistry::with_defaults();
        let out = compute_endowments(&registry, &PermissionSet::new(), &EndowmentOptions::default());
        assert_eq!(out.len(), DEFAULT_ENDOWMENTS.len());
        assert!(!out.iter().any(|e| e == "fetch"));
    }

    #[test]
    fn test_grants_add_exactly_their_primitives() {
        let registry = CapabilityRegistry::with_defaults();
        let out = compute_endowments(
            &registry,
            &grants(&[
                "endowment:network-access",
                "endowment:webassembly",
                "endowment:keyring",
                "snap_dialog",
            ]),
            &EndowmentOptions::default(),
        );
        let extra: Vec<&str> = out[DEFAULT_ENDOWMENTS.len()..]
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(
            extra,
            vec!["fetch", "Request", "Headers", "Response", "WebAssembly"]
        );
    }

    #[test]
    fn test_unknown_grants_are_skipped() {
        let registry = CapabilityRegistry::with_defaults();
        let out = compute_endowments(
            &registry,
            &grants(&["endowment:teleport", "endowment:ethereum-provider"]),
            &EndowmentOptions::default(),
        );
        assert_eq!(out.last().map(String::as_str), Some("ethereum"));
        assert_eq!(out.len(), DEFAULT_ENDOWMENTS.len() + 1);
    }

    #[test]
    fn test_duplicates_keep_first_position() {
        let mut registry = CapabilityRegistry::with_defaults();
        registry
            .register("custom:net", crate::CapabilityKind::NetworkAccess)
            .unwrap();
        let out = compute_endowments(
            &registry,
            &grants(&["custom:net", "endowment:network-access"]),
            &EndowmentOptions::default(),
        );
        assert_eq!(out.iter().filter(|e| *e == "fetch").count(), 1);
        assert_eq!(out.len(), DEFAULT_ENDOWMENTS.len() + 4);
    }
}
