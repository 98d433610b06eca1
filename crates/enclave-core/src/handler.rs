//! Plugin entry points.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// The exported handler a request is dispatched to inside a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandlerType {
    /// JSON-RPC requests from origins.
    #[serde(rename = "onRpcRequest")]
    OnRpcRequest,
    /// Transaction insight requests.
    #[serde(rename = "onTransaction")]
    OnTransaction,
    /// Signature insight requests.
    #[serde(rename = "onSignature")]
    OnSignature,
    /// Scheduled cronjob invocations.
    #[serde(rename = "onCronjob")]
    OnCronjob,
    /// Install lifecycle hook.
    #[serde(rename = "onInstall")]
    OnInstall,
    /// Update lifecycle hook.
    #[serde(rename = "onUpdate")]
    OnUpdate,
    /// Name resolution requests.
    #[serde(rename = "onNameLookup")]
    OnNameLookup,
    /// Keyring requests routed by the multichain negotiator.
    #[serde(rename = "onKeyringRequest")]
    OnKeyringRequest,
    /// User input events from interactive UI.
    #[serde(rename = "onUserInput")]
    OnUserInput,
}

impl HandlerType {
    /// All handler types, in declaration order.
    pub const ALL: [Self; 9] = [
        Self::OnRpcRequest,
        Self::OnTransaction,
        Self::OnSignature,
        Self::OnCronjob,
        Self::OnInstall,
        Self::OnUpdate,
        Self::OnNameLookup,
        Self::OnKeyringRequest,
        Self::OnUserInput,
    ];

    /// The exported name of the handler.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OnRpcRequest => "onRpcRequest",
            Self::OnTransaction => "onTransaction",
            Self::OnSignature => "onSignature",
            Self::OnCronjob => "onCronjob",
            Self::OnInstall => "onInstall",
            Self::OnUpdate => "onUpdate",
            Self::OnNameLookup => "onNameLookup",
            Self::OnKeyringRequest => "onKeyringRequest",
            Self::OnUserInput => "onUserInput",
        }
    }
}

impl fmt::Display for HandlerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HandlerType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|h| h.as_str() == s)
            .ok_or_else(|| CoreError::UnknownHandler(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for handler in HandlerType::ALL {
            assert_eq!(handler.as_str().parse::<HandlerType>().unwrap(), handler);
            assert_eq!(
                serde_json::to_string(&handler).unwrap(),
                format!("\"{}\"", handler.as_str())
            );
        }
        assert!("onSomethingElse".parse::<HandlerType>().is_err());
    }
}
