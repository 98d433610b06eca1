//! Wire envelopes between the supervisor and a runtime.
//!
//! Everything arriving from a runtime is untrusted JSON. [`classify`] sorts it
//! into replies, plugin-originated calls and junk; [`unwrap_response`] is the
//! single place a reply is turned into a result.

use enclave_core::{
    HandlerType, JsonRpcError, JsonRpcNotification, JsonRpcRequest, Origin, PluginId, RequestId,
};
use serde_json::{Map, Value, json};

use crate::error::{ExecutorError, ExecutorResult};

/// Command that loads plugin code into a fresh runtime.
pub const EXECUTE_SNAP: &str = "executeSnap";
/// Command that invokes one of the plugin's handlers.
pub const SNAP_RPC: &str = "snapRpc";

/// Params of the `executeSnap` command.
pub(crate) fn execute_snap_params(plugin_id: &PluginId, source_code: &str, endowments: &[String]) -> Value {
    json!({
        "snapId": plugin_id,
        "sourceCode": source_code,
        "endowments": endowments,
    })
}

/// Params of the `snapRpc` command.
pub(crate) fn snap_rpc_params(
    plugin_id: &PluginId,
    origin: &Origin,
    handler: HandlerType,
    request: &JsonRpcRequest,
) -> Value {
    json!({
        "snapId": plugin_id,
        "origin": origin,
        "handler": handler.as_str(),
        "request": request,
    })
}

/// What an inbound message turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Inbound {
    /// A reply to one of our requests; the full message is kept for
    /// [`unwrap_response`].
    Response { id: RequestId, message: Value },
    /// A call from the plugin.
    Request(JsonRpcRequest),
    /// A notification from the plugin.
    Notification(JsonRpcNotification),
    /// Anything else.
    Invalid(Value),
}

/// Sort an inbound message.
pub(crate) fn classify(message: Value) -> Inbound {
    let Some(object) = message.as_object() else {
        return Inbound::Invalid(message);
    };
    let id = object
        .get("id")
        .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok());

    match (object.get("method"), id) {
        (Some(Value::String(_)), Some(_)) => serde_json::from_value(message.clone())
            .map_or(Inbound::Invalid(message), Inbound::Request),
        (Some(Value::String(_)), None) if !object.contains_key("id") => {
            serde_json::from_value(message.clone())
                .map_or(Inbound::Invalid(message), Inbound::Notification)
        },
        (None, Some(id)) => Inbound::Response { id, message },
        _ => Inbound::Invalid(message),
    }
}

fn structured_error(error: &Map<String, Value>) -> Option<JsonRpcError> {
    let code = error.get("code")?.as_i64()?;
    let message = error.get("message")?.as_str()?;
    Some(JsonRpcError {
        code,
        message: message.to_string(),
        data: error.get("data").cloned(),
    })
}

/// Turn a runtime's reply into a result.
///
/// - `result` passes through unchanged
/// - an `error` with an integer `code` and string `message` is the plugin's
///   own JSON-RPC error and is returned as [`ExecutorError::Plugin`]
/// - anything else is mapped to the generic internal error, with the raw
///   value under `data.cause`
///
/// # Errors
///
/// Returns [`ExecutorError::Plugin`] for every non-success reply.
pub fn unwrap_response(response: Value) -> ExecutorResult<Value> {
    let Value::Object(mut object) = response else {
        return Err(ExecutorError::Plugin(JsonRpcError::internal(Some(
            json!({ "cause": response }),
        ))));
    };

    if let Some(error) = object.remove("error") {
        let mapped = match &error {
            Value::Object(fields) => structured_error(fields),
            _ => None,
        };
        return Err(ExecutorError::Plugin(mapped.unwrap_or_else(|| {
            JsonRpcError::internal(Some(json!({ "cause": error })))
        })));
    }

    if let Some(result) = object.remove("result") {
        return Ok(result);
    }

    Err(ExecutorError::Plugin(JsonRpcError::internal(Some(
        json!({ "cause": Value::Object(object) }),
    ))))
}

#[cfg(test)]
mod tests {
    use enclave_core::error_codes;

    use super::*;

    #[test]
    fn test_result_passes_through() {
        let out = unwrap_response(json!({"jsonrpc": "2.0", "id": 1, "result": {"ok": [1, 2]}}));
        assert_eq!(out.unwrap(), json!({"ok": [1, 2]}));
    }

    #[test]
    fn test_null_result_is_success() {
        let out = unwrap_response(json!({"jsonrpc": "2.0", "id": 1, "result": null}));
        assert_eq!(out.unwrap(), Value::Null);
    }

    #[test]
    fn test_structured_error_passes_through() {
        let err = unwrap_response(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": 4001, "message": "User rejected", "data": {"why": "nope"}}
        }))
        .unwrap_err();
        assert_eq!(
            err,
            ExecutorError::Plugin(
                JsonRpcError::new(4001, "User rejected").with_data(json!({"why": "nope"}))
            )
        );
    }

    #[test]
    fn test_unstructured_error_is_internal() {
        let err = unwrap_response(json!({"id": 1, "error": "boom"})).unwrap_err();
        let ExecutorError::Plugin(rpc) = err else {
            panic!("expected plugin error");
        };
        assert_eq!(rpc.code, error_codes::INTERNAL_ERROR);
        assert_eq!(rpc.message, "Internal JSON-RPC error.");
        assert_eq!(rpc.data, Some(json!({"cause": "boom"})));
    }

    #[test]
    fn test_error_with_string_code_is_internal() {
        let err = unwrap_response(json!({"id": 1, "error": {"code": "E1", "message": "x"}}))
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Plugin(ref e) if e.code == error_codes::INTERNAL_ERROR));
    }

    #[test]
    fn test_non_object_is_internal() {
        let err = unwrap_response(json!([1, 2])).unwrap_err();
        assert!(matches!(err, ExecutorError::Plugin(ref e) if e.data == Some(json!({"cause": [1, 2]}))));
    }

    #[test]
    fn test_classify() {
        assert!(matches!(
            classify(json!({"jsonrpc": "2.0", "id": 3, "result": 1})),
            Inbound::Response { id: RequestId::Number(3), .. }
        ));
        assert!(matches!(
            classify(json!({"jsonrpc": "2.0", "id": "a", "method": "snap_dialog"})),
            Inbound::Request(_)
        ));
        assert!(matches!(
            classify(json!({"jsonrpc": "2.0", "method": "OutboundRequest"})),
            Inbound::Notification(_)
        ));
        assert!(matches!(classify(json!("hello")), Inbound::Invalid(_)));
        assert!(matches!(
            classify(json!({"id": null, "method": "x"})),
            Inbound::Invalid(_)
        ));
    }

    #[test]
    fn test_command_params() {
        let id = PluginId::from_static("npm:wallet");
        let params = execute_snap_params(&id, "code", &["fetch".to_string()]);
        assert_eq!(
            params,
            json!({"snapId": "npm:wallet", "sourceCode": "code", "endowments": ["fetch"]})
        );

        let request = JsonRpcRequest::new(9_i64, "getAccounts", None);
        let origin = Origin::new("https://dapp.example").unwrap();
        let params = snap_rpc_params(&id, &origin, HandlerType::OnKeyringRequest, &request);
        assert_eq!(params["handler"], "onKeyringRequest");
        assert_eq!(params["request"]["method"], "getAccounts");
        assert_eq!(params["origin"], "https://dapp.example");
    }
}
