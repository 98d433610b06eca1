//! Test fixtures for common types.

use enclave_core::{ChainId, JsonRpcError, NamespaceId, Origin, error_codes};
use enclave_multichain::keyring::{GET_ACCOUNTS, HANDLE_DISCONNECT, HANDLE_REQUEST};
use enclave_multichain::{RequestNamespace, RequestedNamespaces};
use serde_json::{Map, Value, json};

use crate::mocks::RecordedCall;

/// The origin most tests connect from.
#[must_use]
pub fn test_origin() -> Origin {
    origin("https://dapp.example")
}

/// Parse an origin, panicking on malformed input.
#[must_use]
pub fn origin(s: &str) -> Origin {
    match Origin::new(s) {
        Ok(origin) => origin,
        Err(e) => panic!("invalid test origin {s}: {e}"),
    }
}

/// Parse a chain id, panicking on malformed input.
#[must_use]
pub fn chain(s: &str) -> ChainId {
    match ChainId::new(s) {
        Ok(chain) => chain,
        Err(e) => panic!("invalid test chain {s}: {e}"),
    }
}

/// Parse a namespace id, panicking on malformed input.
#[must_use]
pub fn namespace(s: &str) -> NamespaceId {
    match NamespaceId::new(s) {
        Ok(ns) => ns,
        Err(e) => panic!("invalid test namespace {s}: {e}"),
    }
}

/// The `namespaces` object of a keyring caveat declaring each namespace
/// with the given chains.
#[must_use]
pub fn keyring_declaration(namespaces: &[(&str, &[&str])]) -> Value {
    let declared: Map<String, Value> = namespaces
        .iter()
        .map(|(ns, chains)| {
            let chains: Vec<Value> = chains
                .iter()
                .map(|c| json!({"id": c, "name": c}))
                .collect();
            ((*ns).to_string(), json!({"chains": chains, "methods": [], "events": []}))
        })
        .collect();
    Value::Object(declared)
}

/// A request for one namespace with the given chains and methods.
#[must_use]
pub fn request_namespaces(entries: &[(&str, &[&str], &[&str])]) -> RequestedNamespaces {
    entries
        .iter()
        .map(|(ns, chains, methods)| {
            let mut request = RequestNamespace::new(chains.iter().map(|c| chain(c)).collect());
            for method in *methods {
                request = request.with_method(*method);
            }
            (namespace(ns), request)
        })
        .collect()
}

/// A keyring plugin handler.
///
/// - `getAccounts` returns `accounts`
/// - `handleRequest` echoes `{chainId, method}` of the forwarded request
/// - `handleDisconnect` returns `null`
pub fn keyring_handler(
    accounts: &[&str],
) -> impl Fn(&RecordedCall) -> Result<Value, JsonRpcError> + Send + Sync + 'static {
    let accounts: Vec<String> = accounts.iter().map(ToString::to_string).collect();
    move |call: &RecordedCall| match call.method.as_str() {
        GET_ACCOUNTS => Ok(json!(accounts)),
        HANDLE_REQUEST => Ok(json!({
            "chainId": call.params["chainId"],
            "method": call.params["request"]["method"],
        })),
        HANDLE_DISCONNECT => Ok(Value::Null),
        other => Err(JsonRpcError::new(
            error_codes::METHOD_NOT_FOUND,
            format!("The method \"{other}\" does not exist / is not available."),
        )),
    }
}
