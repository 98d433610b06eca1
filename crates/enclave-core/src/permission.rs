//! Permission grants and caveats.
//!
//! These mirror what the permission collaborator stores: a grant names the
//! capability it was issued for and carries zero or more caveats that narrow
//! it. The caveat payload stays an opaque JSON value here; typed accessors
//! live next to the capability definitions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A restriction attached to a granted capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Caveat {
    /// Caveat type, e.g. `keyringNamespaces`.
    #[serde(rename = "type")]
    pub caveat_type: String,
    /// Caveat payload.
    pub value: Value,
}

impl Caveat {
    /// Create a caveat.
    pub fn new(caveat_type: impl Into<String>, value: Value) -> Self {
        Self {
            caveat_type: caveat_type.into(),
            value,
        }
    }
}

/// A capability granted to a subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    /// Name of the capability this grant was issued for.
    pub parent_capability: String,
    /// Caveats narrowing the grant.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub caveats: Vec<Caveat>,
}

impl Grant {
    /// A grant without caveats.
    pub fn new(parent_capability: impl Into<String>) -> Self {
        Self {
            parent_capability: parent_capability.into(),
            caveats: Vec::new(),
        }
    }

    /// Add a caveat.
    #[must_use]
    pub fn with_caveat(mut self, caveat: Caveat) -> Self {
        self.caveats.push(caveat);
        self
    }

    /// Find the first caveat of the given type.
    #[must_use]
    pub fn caveat(&self, caveat_type: &str) -> Option<&Caveat> {
        self.caveats.iter().find(|c| c.caveat_type == caveat_type)
    }
}

/// All grants held by one subject, keyed by capability name.
///
/// Ordered so that anything derived from it (endowment lists, logs) is
/// deterministic.
pub type PermissionSet = BTreeMap<String, Grant>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn grant_wire_shape() {
        let grant = Grant::new("endowment:cronjob")
            .with_caveat(Caveat::new("cronjobJobs", json!({"jobs": []})));
        let value = serde_json::to_value(&grant).unwrap();
        assert_eq!(
            value,
            json!({
                "parentCapability": "endowment:cronjob",
                "caveats": [{"type": "cronjobJobs", "value": {"jobs": []}}]
            })
        );
        assert!(grant.caveat("cronjobJobs").is_some());
        assert!(grant.caveat("rpcOrigin").is_none());
    }

    #[test]
    fn missing_caveats_default_to_empty() {
        let grant: Grant =
            serde_json::from_value(json!({"parentCapability": "endowment:network-access"}))
                .unwrap();
        assert!(grant.caveats.is_empty());
    }
}
