//! The built-in capability kinds.

use std::fmt;

use enclave_core::HandlerType;

use crate::caveat;
use crate::spec::{EndowmentOptions, PermissionType};

/// Every capability the host knows how to grant.
///
/// Each variant's endowment list, accepted caveats and unlocked handlers are
/// fixed here; nothing about a kind depends on runtime state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CapabilityKind {
    /// `fetch` and the request/response constructors.
    NetworkAccess,
    /// The `WebAssembly` global.
    WebAssembly,
    /// An EIP-1193 provider exposed as `ethereum`.
    EthereumProvider,
    /// Scheduled invocations of `onCronjob`.
    Cronjob,
    /// Inbound JSON-RPC from dapps and/or other plugins.
    Rpc,
    /// Transaction insight via `onTransaction`.
    TransactionInsight,
    /// Signature insight via `onSignature`.
    SignatureInsight,
    /// Exempts the runtime from idle termination.
    LongRunning,
    /// Keyring requests via `onKeyringRequest`, scoped by namespaces.
    Keyring,
    /// Name resolution via `onNameLookup`.
    NameLookup,
    /// `onInstall` / `onUpdate` hooks.
    LifecycleHooks,
    /// `snap_dialog` restricted method.
    Dialog,
    /// `snap_notify` restricted method.
    Notify,
    /// `snap_manageState` restricted method.
    ManageState,
    /// `snap_getEntropy` restricted method.
    GetEntropy,
}

impl CapabilityKind {
    /// All kinds, in registration order.
    pub const ALL: [Self; 15] = [
        Self::NetworkAccess,
        Self::WebAssembly,
        Self::EthereumProvider,
        Self::Cronjob,
        Self::Rpc,
        Self::TransactionInsight,
        Self::SignatureInsight,
        Self::LongRunning,
        Self::Keyring,
        Self::NameLookup,
        Self::LifecycleHooks,
        Self::Dialog,
        Self::Notify,
        Self::ManageState,
        Self::GetEntropy,
    ];

    /// The name the kind is registered under by default.
    #[must_use]
    pub const fn default_name(&self) -> &'static str {
        match self {
            Self::NetworkAccess => "endowment:network-access",
            Self::WebAssembly => "endowment:webassembly",
            Self::EthereumProvider => "endowment:ethereum-provider",
            Self::Cronjob => "endowment:cronjob",
            Self::Rpc => "endowment:rpc",
            Self::TransactionInsight => "endowment:transaction-insight",
            Self::SignatureInsight => "endowment:signature-insight",
            Self::LongRunning => "endowment:long-running",
            Self::Keyring => "endowment:keyring",
            Self::NameLookup => "endowment:name-lookup",
            Self::LifecycleHooks => "endowment:lifecycle-hooks",
            Self::Dialog => "snap_dialog",
            Self::Notify => "snap_notify",
            Self::ManageState => "snap_manageState",
            Self::GetEntropy => "snap_getEntropy",
        }
    }

    /// Look a kind up by its default name.
    #[must_use]
    pub fn from_default_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.default_name() == name)
    }

    /// Whether the kind hands out host primitives or gates a host method.
    #[must_use]
    pub const fn permission_type(&self) -> PermissionType {
        match self {
            Self::Dialog | Self::Notify | Self::ManageState | Self::GetEntropy => {
                PermissionType::RestrictedMethod
            },
            _ => PermissionType::Endowment,
        }
    }

    /// The host primitives injected into a runtime holding this capability.
    ///
    /// `None` means the capability is a pure feature flag (or a restricted
    /// method): holding the grant is the signal, there is nothing to inject.
    /// The result depends only on the kind.
    #[must_use]
    pub fn endowments(&self, _options: &EndowmentOptions) -> Option<Vec<&'static str>> {
        match self {
            Self::NetworkAccess => Some(vec!["fetch", "Request", "Headers", "Response"]),
            Self::WebAssembly => Some(vec!["WebAssembly"]),
            Self::EthereumProvider => Some(vec!["ethereum"]),
            Self::Cronjob
            | Self::Rpc
            | Self::TransactionInsight
            | Self::SignatureInsight
            | Self::LongRunning
            | Self::Keyring
            | Self::NameLookup
            | Self::LifecycleHooks
            | Self::Dialog
            | Self::Notify
            | Self::ManageState
            | Self::GetEntropy => None,
        }
    }

    /// Caveat types a grant of this kind may carry. `None` means no caveats
    /// are accepted at all.
    #[must_use]
    pub const fn allowed_caveats(&self) -> Option<&'static [&'static str]> {
        match self {
            Self::Cronjob => Some(&[caveat::CRONJOB_JOBS]),
            Self::Rpc => Some(&[caveat::RPC_ORIGIN]),
            Self::TransactionInsight => Some(&[caveat::TRANSACTION_ORIGIN]),
            Self::SignatureInsight => Some(&[caveat::SIGNATURE_ORIGIN]),
            Self::Keyring => Some(&[caveat::KEYRING_NAMESPACES]),
            Self::NameLookup => Some(&[caveat::CHAIN_IDS]),
            _ => None,
        }
    }

    /// Plugin handlers this capability unlocks.
    #[must_use]
    pub const fn handlers(&self) -> &'static [HandlerType] {
        match self {
            Self::Cronjob => &[HandlerType::OnCronjob],
            Self::Rpc => &[HandlerType::OnRpcRequest],
            Self::TransactionInsight => &[HandlerType::OnTransaction],
            Self::SignatureInsight => &[HandlerType::OnSignature],
            Self::Keyring => &[HandlerType::OnKeyringRequest],
            Self::NameLookup => &[HandlerType::OnNameLookup],
            Self::LifecycleHooks => &[HandlerType::OnInstall, HandlerType::OnUpdate],
            _ => &[],
        }
    }

    /// The capability that must be granted before `handler` may be invoked.
    #[must_use]
    pub fn for_handler(handler: HandlerType) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.handlers().contains(&handler))
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.default_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_access_is_stable_across_calls() {
        let opts = EndowmentOptions::default();
        let first = CapabilityKind::NetworkAccess.endowments(&opts);
        for _ in 0..10 {
            assert_eq!(CapabilityKind::NetworkAccess.endowments(&opts), first);
        }
        assert_eq!(first, Some(vec!["fetch", "Request", "Headers", "Response"]));
    }

    #[test]
    fn feature_flags_inject_nothing() {
        let opts = EndowmentOptions::default();
        for kind in [
            CapabilityKind::Cronjob,
            CapabilityKind::Rpc,
            CapabilityKind::LongRunning,
            CapabilityKind::Keyring,
        ] {
            assert_eq!(kind.endowments(&opts), None, "{kind}");
        }
    }

    #[test]
    fn default_names_are_unique_and_resolvable() {
        for kind in CapabilityKind::ALL {
            assert_eq!(CapabilityKind::from_default_name(kind.default_name()), Some(kind));
        }
        assert_eq!(CapabilityKind::from_default_name("endowment:nope"), None);
    }

    #[test]
    fn restricted_methods_are_typed() {
        assert_eq!(
            CapabilityKind::Dialog.permission_type(),
            PermissionType::RestrictedMethod
        );
        assert_eq!(
            CapabilityKind::WebAssembly.permission_type(),
            PermissionType::Endowment
        );
    }

    #[test]
    fn handler_gating() {
        assert_eq!(
            CapabilityKind::for_handler(HandlerType::OnKeyringRequest),
            Some(CapabilityKind::Keyring)
        );
        assert_eq!(
            CapabilityKind::for_handler(HandlerType::OnUpdate),
            Some(CapabilityKind::LifecycleHooks)
        );
        assert_eq!(CapabilityKind::for_handler(HandlerType::OnUserInput), None);
    }
}
