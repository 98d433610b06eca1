//! Plugin and origin identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Unique, stable identifier of an installed plugin.
///
/// Plugin IDs look like `"npm:@acme/keyring"` or `"local:http://localhost:8080"`.
/// They must be non-empty and may only contain lowercase ASCII letters,
/// digits and the punctuation `- _ . / : @`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PluginId(String);

/// Deserialize with validation so that crafted grant data cannot smuggle in
/// ids the rest of the system would refuse to construct.
impl<'de> Deserialize<'de> for PluginId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

impl PluginId {
    /// Create a new `PluginId`, validating the format.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidPluginId`] if the ID is empty or contains
    /// invalid characters.
    pub fn new(id: impl Into<String>) -> CoreResult<Self> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Create a `PluginId` from a literal known to be valid.
    ///
    /// Validation is only asserted in debug builds; use [`PluginId::new`] for
    /// anything that did not come from source code.
    #[must_use]
    pub fn from_static(id: &str) -> Self {
        debug_assert!(Self::validate(id).is_ok(), "invalid plugin id literal: {id:?}");
        Self(id.to_string())
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check whether a string is a valid plugin ID without constructing one.
    #[must_use]
    pub fn is_valid_id(id: &str) -> bool {
        Self::validate(id).is_ok()
    }

    fn validate(id: &str) -> CoreResult<()> {
        if id.is_empty() {
            return Err(CoreError::InvalidPluginId(
                "plugin id must not be empty".into(),
            ));
        }
        if !id.chars().all(|c| {
            c.is_ascii_lowercase()
                || c.is_ascii_digit()
                || matches!(c, '-' | '_' | '.' | '/' | ':' | '@')
        }) {
            return Err(CoreError::InvalidPluginId(format!(
                "plugin id may only contain lowercase alphanumerics and -_./:@, got: {id}"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PluginId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The external caller of a session, typically a web origin such as
/// `https://dapp.example`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Origin(String);

impl<'de> Deserialize<'de> for Origin {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

impl Origin {
    /// Create a new origin.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOrigin`] if the value is empty or contains
    /// whitespace.
    pub fn new(origin: impl Into<String>) -> CoreResult<Self> {
        let origin = origin.into();
        if origin.is_empty() || origin.chars().any(char::is_whitespace) {
            return Err(CoreError::InvalidOrigin(origin));
        }
        Ok(Self(origin))
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Origin {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_plugin_ids() {
        assert!(PluginId::new("npm:@acme/keyring").is_ok());
        assert!(PluginId::new("local:http://localhost:8080").is_ok());
        assert!(PluginId::new("my-plugin_v2.1").is_ok());
        assert!(PluginId::new("a").is_ok());
    }

    #[test]
    fn test_invalid_plugin_ids() {
        // Empty
        assert!(PluginId::new("").is_err());
        // Uppercase
        assert!(PluginId::new("npm:MyPlugin").is_err());
        // Spaces
        assert!(PluginId::new("my plugin").is_err());
        // Other punctuation
        assert!(PluginId::new("plugin#1").is_err());
    }

    #[test]
    fn test_plugin_id_serde_rejects_malformed() {
        let ok: PluginId = serde_json::from_str("\"npm:wallet\"").unwrap();
        assert_eq!(ok.as_str(), "npm:wallet");
        assert!(serde_json::from_str::<PluginId>("\"Bad Id\"").is_err());
    }

    #[test]
    fn test_from_static_accepts_valid_literal() {
        assert_eq!(PluginId::from_static("npm:wallet"), PluginId::new("npm:wallet").unwrap());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "invalid plugin id literal")]
    fn test_from_static_rejects_invalid_literal() {
        let _ = PluginId::from_static("Not A Plugin");
    }

    #[test]
    fn test_origin_validation() {
        assert!(Origin::new("https://dapp.example").is_ok());
        assert!(Origin::new("").is_err());
        assert!(Origin::new("https://a b").is_err());
        assert_eq!(
            Origin::new("metamask").unwrap().to_string(),
            "metamask".to_string()
        );
    }
}
