//! Caveat types, validation and typed accessors.
//!
//! Grants carry caveat values as raw JSON. The functions here check those
//! values against the shape each caveat type expects and hand back typed
//! views, so consumers never poke at `serde_json::Value` themselves.

use std::collections::BTreeMap;

use enclave_core::{Caveat, ChainId, Grant, NamespaceId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CapabilityError, CapabilityResult};
use crate::spec::CapabilitySpec;

/// Scheduled jobs of `endowment:cronjob`.
pub const CRONJOB_JOBS: &str = "cronjobJobs";
/// Who may call `endowment:rpc`.
pub const RPC_ORIGIN: &str = "rpcOrigin";
/// Whether `endowment:transaction-insight` sees the transaction origin.
pub const TRANSACTION_ORIGIN: &str = "transactionOrigin";
/// Whether `endowment:signature-insight` sees the signature origin.
pub const SIGNATURE_ORIGIN: &str = "signatureOrigin";
/// Namespaces served through `endowment:keyring`.
pub const KEYRING_NAMESPACES: &str = "keyringNamespaces";
/// Chains served through `endowment:name-lookup`.
pub const CHAIN_IDS: &str = "chainIds";

// ---------------------------------------------------------------------------
// Caveat payloads
// ---------------------------------------------------------------------------

/// One chain a keyring namespace serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyringChain {
    /// Fully qualified chain id.
    pub id: ChainId,
    /// Human-readable chain name.
    pub name: String,
}

/// What a keyring plugin declares for one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyringNamespace {
    /// Chains served, all within the namespace.
    pub chains: Vec<KeyringChain>,
    /// RPC methods handled.
    #[serde(default)]
    pub methods: Vec<String>,
    /// Events emitted.
    #[serde(default)]
    pub events: Vec<String>,
}

impl KeyringNamespace {
    /// Whether `chain` is one of the declared chains.
    #[must_use]
    pub fn serves(&self, chain: &ChainId) -> bool {
        self.chains.iter().any(|c| &c.id == chain)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct KeyringNamespacesValue {
    namespaces: BTreeMap<NamespaceId, KeyringNamespace>,
}

/// The JSON-RPC call a cron job issues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CronjobRequest {
    /// Method name.
    pub method: String,
    /// Optional parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A scheduled job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CronjobSpecification {
    /// Cron expression, five or six whitespace separated fields.
    pub expression: String,
    /// Call issued on each tick.
    pub request: CronjobRequest,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CronjobJobsValue {
    jobs: Vec<CronjobSpecification>,
}

/// Which callers may reach a plugin's `onRpcRequest` handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RpcOrigins {
    /// Websites.
    #[serde(default)]
    pub dapps: bool,
    /// Other plugins.
    #[serde(default)]
    pub snaps: bool,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn invalid(caveat: &str, message: impl Into<String>) -> CapabilityError {
    CapabilityError::InvalidCaveat {
        caveat: caveat.to_string(),
        message: message.into(),
    }
}

fn parse<T: DeserializeOwned>(caveat: &str, value: &Value) -> CapabilityResult<T> {
    serde_json::from_value(value.clone()).map_err(|e| invalid(caveat, e.to_string()))
}

fn is_cron_expression(expression: &str) -> bool {
    let fields = expression.split_whitespace().count();
    fields == 5 || fields == 6
}

/// Check one caveat value against the shape its type expects.
///
/// Caveat types this crate does not know are accepted as-is; whether they are
/// allowed at all is decided by [`validate_grant`].
///
/// # Errors
///
/// Returns [`CapabilityError::InvalidCaveat`] if the value is malformed.
pub fn validate_caveat(caveat: &Caveat) -> CapabilityResult<()> {
    let ty = caveat.caveat_type.as_str();
    match ty {
        KEYRING_NAMESPACES => parse_keyring_namespaces(&caveat.value).map(drop),
        CRONJOB_JOBS => parse_cronjob_jobs(&caveat.value).map(drop),
        RPC_ORIGIN => parse_rpc_origins(&caveat.value).map(drop),
        TRANSACTION_ORIGIN | SIGNATURE_ORIGIN => parse::<bool>(ty, &caveat.value).map(drop),
        CHAIN_IDS => parse_chain_ids(&caveat.value).map(drop),
        _ => Ok(()),
    }
}

/// Check a grant against the spec of the capability it was issued for.
///
/// # Errors
///
/// - [`CapabilityError::DisallowedCaveat`] if a caveat type is not in the
///   spec's allowed list (or the spec allows none)
/// - [`CapabilityError::InvalidCaveat`] if a caveat value is malformed
pub fn validate_grant(spec: &CapabilitySpec, grant: &Grant) -> CapabilityResult<()> {
    for caveat in &grant.caveats {
        if !spec.allows_caveat(&caveat.caveat_type) {
            return Err(CapabilityError::DisallowedCaveat {
                capability: spec.name.clone(),
                caveat: caveat.caveat_type.clone(),
            });
        }
        validate_caveat(caveat)?;
    }
    Ok(())
}

fn parse_keyring_namespaces(value: &Value) -> CapabilityResult<BTreeMap<NamespaceId, KeyringNamespace>> {
    let parsed: KeyringNamespacesValue = parse(KEYRING_NAMESPACES, value)?;
    for (namespace, declared) in &parsed.namespaces {
        if let Some(stray) = declared.chains.iter().find(|c| &c.id.namespace() != namespace) {
            return Err(invalid(
                KEYRING_NAMESPACES,
                format!("chain {} is not in namespace {namespace}", stray.id),
            ));
        }
    }
    Ok(parsed.namespaces)
}

fn parse_cronjob_jobs(value: &Value) -> CapabilityResult<Vec<CronjobSpecification>> {
    let parsed: CronjobJobsValue = parse(CRONJOB_JOBS, value)?;
    if let Some(bad) = parsed.jobs.iter().find(|j| !is_cron_expression(&j.expression)) {
        return Err(invalid(
            CRONJOB_JOBS,
            format!("invalid cron expression: {:?}", bad.expression),
        ));
    }
    Ok(parsed.jobs)
}

fn parse_rpc_origins(value: &Value) -> CapabilityResult<RpcOrigins> {
    let origins: RpcOrigins = parse(RPC_ORIGIN, value)?;
    if !origins.dapps && !origins.snaps {
        return Err(invalid(RPC_ORIGIN, "at least one of dapps or snaps must be true"));
    }
    Ok(origins)
}

fn parse_chain_ids(value: &Value) -> CapabilityResult<Vec<ChainId>> {
    let chains: Vec<ChainId> = parse(CHAIN_IDS, value)?;
    if chains.is_empty() {
        return Err(invalid(CHAIN_IDS, "expected at least one chain id"));
    }
    Ok(chains)
}

// ---------------------------------------------------------------------------
// Typed accessors
// ---------------------------------------------------------------------------

/// Namespaces declared by a keyring grant.
///
/// Returns `Ok(None)` when the grant carries no `keyringNamespaces` caveat.
///
/// # Errors
///
/// Returns [`CapabilityError::InvalidCaveat`] if the caveat is malformed.
pub fn keyring_namespaces(grant: &Grant) -> CapabilityResult<Option<BTreeMap<NamespaceId, KeyringNamespace>>> {
    grant
        .caveat(KEYRING_NAMESPACES)
        .map(|c| parse_keyring_namespaces(&c.value))
        .transpose()
}

/// Jobs declared by a cronjob grant.
///
/// # Errors
///
/// Returns [`CapabilityError::InvalidCaveat`] if the caveat is malformed.
pub fn cronjob_jobs(grant: &Grant) -> CapabilityResult<Option<Vec<CronjobSpecification>>> {
    grant
        .caveat(CRONJOB_JOBS)
        .map(|c| parse_cronjob_jobs(&c.value))
        .transpose()
}

/// Callers allowed by an rpc grant.
///
/// # Errors
///
/// Returns [`CapabilityError::InvalidCaveat`] if the caveat is malformed.
pub fn rpc_origins(grant: &Grant) -> CapabilityResult<Option<RpcOrigins>> {
    grant
        .caveat(RPC_ORIGIN)
        .map(|c| parse_rpc_origins(&c.value))
        .transpose()
}

/// Whether a transaction-insight grant exposes the transaction origin.
/// A grant without the caveat does not.
///
/// # Errors
///
/// Returns [`CapabilityError::InvalidCaveat`] if the caveat is not a boolean.
pub fn transaction_origin(grant: &Grant) -> CapabilityResult<bool> {
    grant
        .caveat(TRANSACTION_ORIGIN)
        .map_or(Ok(false), |c| parse(TRANSACTION_ORIGIN, &c.value))
}

/// Chains served by a name-lookup grant.
///
/// # Errors
///
/// Returns [`CapabilityError::InvalidCaveat`] if the caveat is malformed.
pub fn name_lookup_chains(grant: &Grant) -> CapabilityResult<Option<Vec<ChainId>>> {
    grant
        .caveat(CHAIN_IDS)
        .map(|c| parse_chain_ids(&c.value))
        .transpose()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{BuilderOptions, CapabilityRegistry};

    fn keyring_grant(value: Value) -> Grant {
        Grant::new("endowment:keyring").with_caveat(Caveat::new(KEYRING_NAMESPACES, value))
    }

    #[test]
    fn test_keyring_namespaces_typed() {
        let grant = keyring_grant(json!({
            "namespaces": {
                "eip155": {
                    "chains": [{"id": "eip155:1", "name": "Ethereum"}],
                    "methods": ["eth_signTransaction"],
                    "events": ["accountsChanged"]
                }
            }
        }));
        let namespaces = keyring_namespaces(&grant).unwrap().unwrap();
        let eip155 = &namespaces[&NamespaceId::new("eip155").unwrap()];
        assert!(eip155.serves(&ChainId::new("eip155:1").unwrap()));
        assert!(!eip155.serves(&ChainId::new("eip155:5").unwrap()));
        assert_eq!(eip155.methods, vec!["eth_signTransaction"]);
    }

    #[test]
    fn test_keyring_chain_outside_namespace() {
        let grant = keyring_grant(json!({
            "namespaces": {"eip155": {"chains": [{"id": "bip122:000000000019d6689c085ae165831e93", "name": "Bitcoin"}]}}
        }));
        assert!(matches!(
            keyring_namespaces(&grant),
            Err(CapabilityError::InvalidCaveat { .. })
        ));
    }

    #[test]
    fn test_keyring_rejects_bad_ids() {
        let grant = keyring_grant(json!({"namespaces": {"EIP": {"chains": []}}}));
        assert!(keyring_namespaces(&grant).is_err());
        assert_eq!(keyring_namespaces(&Grant::new("endowment:keyring")).unwrap(), None);
    }

    #[test]
    fn test_validate_grant_disallowed() {
        let registry = CapabilityRegistry::with_defaults();
        let spec = registry
            .build("endowment:network-access", &BuilderOptions::default())
            .unwrap();
        let grant = Grant::new("endowment:network-access")
            .with_caveat(Caveat::new(RPC_ORIGIN, json!({"dapps": true})));
        assert_eq!(
            validate_grant(&spec, &grant),
            Err(CapabilityError::DisallowedCaveat {
                capability: "endowment:network-access".into(),
                caveat: RPC_ORIGIN.into(),
            })
        );
    }

    #[test]
    fn test_validate_grant_malformed_value() {
        let registry = CapabilityRegistry::with_defaults();
        let spec = registry
            .build("endowment:rpc", &BuilderOptions::default())
            .unwrap();
        let none = Grant::new("endowment:rpc")
            .with_caveat(Caveat::new(RPC_ORIGIN, json!({"dapps": false})));
        assert!(matches!(
            validate_grant(&spec, &none),
            Err(CapabilityError::InvalidCaveat { .. })
        ));
        let ok = Grant::new("endowment:rpc")
            .with_caveat(Caveat::new(RPC_ORIGIN, json!({"snaps": true})));
        assert!(validate_grant(&spec, &ok).is_ok());
        assert_eq!(
            rpc_origins(&ok).unwrap(),
            Some(RpcOrigins {
                dapps: false,
                snaps: true
            })
        );
    }

    #[test]
    fn test_cronjob_jobs() {
        let grant = Grant::new("endowment:cronjob").with_caveat(Caveat::new(
            CRONJOB_JOBS,
            json!({"jobs": [{"expression": "*/5 * * * *", "request": {"method": "tick"}}]}),
        ));
        let jobs = cronjob_jobs(&grant).unwrap().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].request.method, "tick");

        let bad = Grant::new("endowment:cronjob").with_caveat(Caveat::new(
            CRONJOB_JOBS,
            json!({"jobs": [{"expression": "soon", "request": {"method": "tick"}}]}),
        ));
        assert!(cronjob_jobs(&bad).is_err());
    }

    #[test]
    fn test_flags_and_chains() {
        let insight = Grant::new("endowment:transaction-insight")
            .with_caveat(Caveat::new(TRANSACTION_ORIGIN, json!(true)));
        assert!(transaction_origin(&insight).unwrap());
        assert!(!transaction_origin(&Grant::new("endowment:transaction-insight")).unwrap());

        let lookup = Grant::new("endowment:name-lookup")
            .with_caveat(Caveat::new(CHAIN_IDS, json!(["eip155:1"])));
        assert_eq!(
            name_lookup_chains(&lookup).unwrap(),
            Some(vec![ChainId::new("eip155:1").unwrap()])
        );
        let empty = Grant::new("endowment:name-lookup")
            .with_caveat(Caveat::new(CHAIN_IDS, json!([])));
        assert!(name_lookup_chains(&empty).is_err());
    }
}
