//! Calls into a plugin's keyring handler.

use enclave_core::{AccountId, ChainId, HandlerType, JsonRpcRequest, Origin, PluginId};
use enclave_executor::{ExecutionSupervisor, ExecutorResult, RpcCall};
use serde_json::{Value, json};
use tracing::{debug, warn};
use uuid::Uuid;

/// Lists the accounts a keyring offers for the given chains.
pub const GET_ACCOUNTS: &str = "getAccounts";
/// Forwards an origin's request for one chain.
pub const HANDLE_REQUEST: &str = "handleRequest";
/// Tells a keyring the origin's session has ended.
pub const HANDLE_DISCONNECT: &str = "handleDisconnect";

fn keyring_call(origin: &Origin, method: &str, params: Value) -> RpcCall {
    RpcCall::new(
        origin.clone(),
        HandlerType::OnKeyringRequest,
        JsonRpcRequest::new(Uuid::new_v4().to_string(), method, Some(params)),
    )
}

/// Ask `plugin_id` for its accounts on `chains`.
///
/// Never fails: errors and malformed answers are logged and yield no
/// accounts, which simply drops the plugin from consideration.
pub(crate) async fn get_accounts(
    supervisor: &ExecutionSupervisor,
    origin: &Origin,
    plugin_id: &PluginId,
    chains: &[ChainId],
) -> Vec<AccountId> {
    let call = keyring_call(origin, GET_ACCOUNTS, json!({ "chainIds": chains }));
    let reply = match supervisor.handle_rpc_request(plugin_id, call).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!(plugin_id = %plugin_id, error = %e, "Failed to fetch keyring accounts");
            return Vec::new();
        },
    };

    let Value::Array(entries) = reply else {
        warn!(plugin_id = %plugin_id, "Keyring returned a non-array account list");
        return Vec::new();
    };

    let accounts: Vec<AccountId> = entries
        .into_iter()
        .filter_map(|entry| {
            let parsed = entry.as_str().map(AccountId::new);
            match parsed {
                Some(Ok(account)) => Some(account),
                _ => {
                    warn!(plugin_id = %plugin_id, account = %entry, "Dropping malformed account id");
                    None
                },
            }
        })
        .collect();
    debug!(plugin_id = %plugin_id, count = accounts.len(), "Fetched keyring accounts");
    accounts
}

/// Forward `request` for `chain_id` and return the plugin's answer verbatim.
pub(crate) async fn handle_request(
    supervisor: &ExecutionSupervisor,
    origin: &Origin,
    plugin_id: &PluginId,
    chain_id: &ChainId,
    request: &JsonRpcRequest,
) -> ExecutorResult<Value> {
    let call = keyring_call(
        origin,
        HANDLE_REQUEST,
        json!({ "chainId": chain_id, "request": request }),
    );
    supervisor.handle_rpc_request(plugin_id, call).await
}

/// Tell every plugin in `plugins` the origin disconnected, on a spawned task.
pub(crate) fn notify_disconnect(
    supervisor: &ExecutionSupervisor,
    origin: &Origin,
    plugins: impl IntoIterator<Item = PluginId>,
) {
    for plugin_id in plugins {
        let supervisor = supervisor.clone();
        let call = keyring_call(origin, HANDLE_DISCONNECT, json!({ "origin": origin }));
        tokio::spawn(async move {
            if let Err(e) = supervisor.handle_rpc_request(&plugin_id, call).await {
                debug!(plugin_id = %plugin_id, error = %e, "Disconnect notification failed");
            }
        });
    }
}
