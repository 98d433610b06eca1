//! CAIP-style namespace, chain and account identifiers.
//!
//! | type | shape | example |
//! |---|---|---|
//! | [`NamespaceId`] | `[-a-z0-9]{3,8}` | `eip155` |
//! | [`ChainId`] | `namespace:[-_a-zA-Z0-9]{1,32}` | `eip155:1` |
//! | [`AccountId`] | `chain:[-.%a-zA-Z0-9]{1,128}` | `eip155:1:0xab16…` |
//!
//! Parsing is strict: anything outside these shapes is rejected rather than
//! normalised.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

const NAMESPACE_MIN: usize = 3;
const NAMESPACE_MAX: usize = 8;
const REFERENCE_MAX: usize = 32;
const ADDRESS_MAX: usize = 128;

fn is_namespace(s: &str) -> bool {
    (NAMESPACE_MIN..=NAMESPACE_MAX).contains(&s.len())
        && s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn is_reference(s: &str) -> bool {
    (1..=REFERENCE_MAX).contains(&s.len())
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn is_address(s: &str) -> bool {
    (1..=ADDRESS_MAX).contains(&s.len())
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '%'))
}

macro_rules! string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }
    };
}

/// A protocol namespace such as `eip155` or `bip122`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespaceId(String);

impl NamespaceId {
    /// Parse a namespace identifier.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidNamespace`] if `s` is not 3-8 characters
    /// of `[-a-z0-9]`.
    pub fn new(s: impl Into<String>) -> CoreResult<Self> {
        let s = s.into();
        if !is_namespace(&s) {
            return Err(CoreError::InvalidNamespace(s));
        }
        Ok(Self(s))
    }

    /// The namespace as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for NamespaceId {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        Self::new(s)
    }
}

string_serde!(NamespaceId);

/// A fully qualified chain identifier, `namespace:reference`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId {
    raw: String,
    split: usize,
}

impl ChainId {
    /// Parse a chain identifier.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidChainId`] if `s` is not exactly
    /// `namespace:reference` with both parts well formed.
    pub fn new(s: impl Into<String>) -> CoreResult<Self> {
        let raw = s.into();
        let Some((namespace, reference)) = raw.split_once(':') else {
            return Err(CoreError::InvalidChainId(raw));
        };
        if !is_namespace(namespace) || !is_reference(reference) {
            return Err(CoreError::InvalidChainId(raw));
        }
        let split = namespace.len();
        Ok(Self { raw, split })
    }

    /// The full identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The namespace part, e.g. `eip155` for `eip155:1`.
    #[must_use]
    pub fn namespace(&self) -> NamespaceId {
        NamespaceId(self.raw[..self.split].to_string())
    }

    /// The chain reference within the namespace, e.g. `1` for `eip155:1`.
    #[must_use]
    pub fn reference(&self) -> &str {
        &self.raw[self.split.saturating_add(1)..]
    }
}

impl FromStr for ChainId {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        Self::new(s)
    }
}

string_serde!(ChainId);

/// An account on a specific chain, `namespace:reference:address`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId {
    raw: String,
    split: usize,
}

impl AccountId {
    /// Parse an account identifier.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidAccountId`] if `s` is not a valid chain id
    /// followed by `:` and a well-formed address.
    pub fn new(s: impl Into<String>) -> CoreResult<Self> {
        let raw = s.into();
        let Some((chain, address)) = raw.rsplit_once(':') else {
            return Err(CoreError::InvalidAccountId(raw));
        };
        if ChainId::new(chain).is_err() || !is_address(address) {
            return Err(CoreError::InvalidAccountId(raw));
        }
        let split = chain.len();
        Ok(Self { raw, split })
    }

    /// The full identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The chain this account lives on.
    #[must_use]
    pub fn chain_id(&self) -> ChainId {
        let chain = &self.raw[..self.split];
        let split = chain.find(':').unwrap_or_default();
        ChainId {
            raw: chain.to_string(),
            split,
        }
    }

    /// The address within the chain.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.raw[self.split.saturating_add(1)..]
    }
}

impl FromStr for AccountId {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        Self::new(s)
    }
}

string_serde!(AccountId);
