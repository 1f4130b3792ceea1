//! Pure helper functions for tool dispatch
//!
//! Request parsing and response building, kept free of I/O so they can be
//! tested without a credential or a network.

use serde_json::{Value, json};

use crate::error::rpc_codes;
use crate::oauth::{AuthError, AuthStatus};
use crate::protocol::{
    Content, Info, InitializeResult, JsonRpcResponse, RequestId, ServerCapabilities, Tool,
    ToolAnnotations, ToolsCallResult, ToolsCapability,
};
use crate::{Error, fitbit};

/// Tool returning the URL the user opens to authorize Fitbit access
pub(crate) const GET_AUTH_URL: &str = "get_auth_url";
/// Tool reporting whether a credential is held
pub(crate) const CHECK_AUTH_STATUS: &str = "check_auth_status";
/// Tool discarding the held credential
pub(crate) const SIGN_OUT: &str = "sign_out";

const INSTRUCTIONS: &str = "Fitbit health data tools. If a tool reports not_authenticated, \
     call get_auth_url, have the user open the URL and approve access, then retry. \
     Date arguments accept \"today\" or YYYY-MM-DD.";

/// Extract the client's requested protocol version from `initialize` params.
pub(crate) fn extract_client_version(params: Option<&Value>) -> &str {
    params
        .and_then(|p| p.get("protocolVersion"))
        .and_then(Value::as_str)
        .unwrap_or("2024-11-05")
}

/// Build the `InitializeResult` for a given negotiated protocol version.
pub(crate) fn build_initialize_result(negotiated_version: &str) -> InitializeResult {
    InitializeResult {
        protocol_version: negotiated_version.to_string(),
        capabilities: ServerCapabilities {
            tools: Some(ToolsCapability { list_changed: false }),
        },
        server_info: Info {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: Some("Fitbit MCP Server".to_string()),
        },
        instructions: Some(INSTRUCTIONS.to_string()),
    }
}

fn no_args_tool(name: &str, description: &str, annotations: ToolAnnotations) -> Tool {
    Tool {
        name: name.to_string(),
        title: None,
        description: Some(description.to_string()),
        input_schema: json!({"type": "object", "properties": {}}),
        annotations: Some(annotations),
    }
}

/// Credential tools followed by every catalog endpoint
pub(crate) fn build_tools() -> Vec<Tool> {
    let local_read = ToolAnnotations {
        read_only_hint: Some(true),
        destructive_hint: Some(false),
        idempotent_hint: Some(true),
        open_world_hint: Some(false),
    };
    let local_write = ToolAnnotations {
        read_only_hint: Some(false),
        destructive_hint: Some(true),
        idempotent_hint: Some(true),
        open_world_hint: Some(false),
    };

    let mut tools = vec![
        no_args_tool(
            GET_AUTH_URL,
            "Get the Fitbit authorization URL. Use on first run or when re-authorization is needed.",
            local_read.clone(),
        ),
        no_args_tool(CHECK_AUTH_STATUS, "Check whether Fitbit access is authorized", local_read),
        no_args_tool(SIGN_OUT, "Forget the stored Fitbit credential", local_write),
    ];
    tools.extend(fitbit::CATALOG.iter().map(fitbit::Endpoint::tool));
    tools
}

/// Extract a request id (string or integer).
pub(crate) fn extract_request_id(value: &Value) -> Option<RequestId> {
    match value {
        Value::String(s) => Some(RequestId::String(s.clone())),
        Value::Number(n) => n.as_i64().map(RequestId::Number),
        _ => None,
    }
}

/// Check whether a method name represents a notification (no response expected).
pub(crate) fn is_notification_method(method: &str) -> bool {
    method.starts_with("notifications/")
}

/// Parse JSON-RPC request or notification
/// Returns (Option<RequestId>, method, params) - id is None for notifications
#[allow(clippy::result_large_err)] // JsonRpcResponse used directly as HTTP error body
pub(crate) fn parse_request(
    value: &Value,
) -> Result<(Option<RequestId>, String, Option<Value>), JsonRpcResponse> {
    let jsonrpc = value.get("jsonrpc").and_then(Value::as_str);
    if jsonrpc != Some("2.0") {
        return Err(JsonRpcResponse::error(
            None,
            rpc_codes::INVALID_REQUEST,
            "Invalid JSON-RPC version",
        ));
    }

    let id = value.get("id").and_then(extract_request_id);

    let method = value
        .get("method")
        .and_then(Value::as_str)
        .ok_or_else(|| JsonRpcResponse::error(id.clone(), rpc_codes::INVALID_REQUEST, "Missing method"))?;

    let params = value.get("params").cloned();

    if !is_notification_method(method) && id.is_none() {
        return Err(JsonRpcResponse::error(None, rpc_codes::INVALID_REQUEST, "Missing id"));
    }

    Ok((id, method.to_string(), params))
}

/// Extract the `tools/call` parameters (tool name and arguments) from request params.
///
/// Returns `("", {})` when the expected fields are absent so callers never
/// need to deal with `Option`.
pub(crate) fn extract_tools_call_params(params: Option<&Value>) -> (&str, Value) {
    let tool_name = params
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("");
    let arguments = params
        .and_then(|p| p.get("arguments"))
        .cloned()
        .unwrap_or(json!({}));
    (tool_name, arguments)
}

fn tool_result(id: RequestId, text: String, is_error: bool) -> JsonRpcResponse {
    let result = ToolsCallResult {
        content: vec![Content::text(text)],
        is_error,
    };
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(Some(id), rpc_codes::INTERNAL_ERROR, e.to_string()),
    }
}

/// Wrap plain text as a successful tool result.
pub(crate) fn wrap_tool_text(id: RequestId, text: impl Into<String>) -> JsonRpcResponse {
    tool_result(id, text.into(), false)
}

/// Wrap a JSON value as a successful tool result with pretty-printed text.
pub(crate) fn wrap_tool_success(id: RequestId, content: &Value) -> JsonRpcResponse {
    tool_result(id, serde_json::to_string_pretty(content).unwrap_or_default(), false)
}

/// Structured payload describing a failed tool call
pub(crate) fn build_error_payload(err: &Error) -> Value {
    let mut payload = json!({
        "error": err.kind(),
        "message": err.to_string(),
    });
    let upstream = match err {
        Error::Upstream { status, body }
        | Error::Auth(AuthError::UpstreamRejected { status, body }) => Some((status, body)),
        _ => None,
    };
    if let Some((status, body)) = upstream {
        payload["status"] = json!(status);
        payload["body"] = json!(body);
    }
    payload
}

/// Wrap an error as an `isError` tool result.
pub(crate) fn wrap_tool_error(id: RequestId, err: &Error) -> JsonRpcResponse {
    tool_result(
        id,
        serde_json::to_string_pretty(&build_error_payload(err)).unwrap_or_default(),
        true,
    )
}

/// `check_auth_status` payload: the status plus a one-line summary
pub(crate) fn build_status_payload(status: &AuthStatus) -> Value {
    let message = match status {
        AuthStatus::Unauthenticated => {
            "Not authenticated. Call get_auth_url to authorize.".to_string()
        }
        AuthStatus::Valid { subject_id, expires_at } => {
            format!("Authenticated as {subject_id}, access token valid until {expires_at}")
        }
        AuthStatus::Expiring { subject_id, .. } => {
            format!("Authenticated as {subject_id}, access token will be refreshed on next use")
        }
    };
    let mut payload = serde_json::to_value(status).unwrap_or_else(|_| json!({}));
    payload["message"] = json!(message);
    payload
}
