//! JSON-RPC envelopes and the MCP results this server answers with
//!
//! Requests are read as loose `serde_json::Value`s by the router, so only the
//! outgoing side is typed here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Content, Info, ServerCapabilities, Tool};

/// Request id echoed back on the response; clients send either form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// `"id": "abc"`
    String(String),
    /// `"id": 7`
    Number(i64),
}

/// Outgoing JSON-RPC 2.0 response; exactly one of `result` and `error` is set
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`
    pub jsonrpc: &'static str,
    /// `null` when the request id could not be recovered
    pub id: Option<RequestId>,
    /// Method result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Method failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Answer `id` with `result`
    #[must_use]
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    /// Answer `id` with a protocol-level error
    pub fn error(id: Option<RequestId>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// `error` member of a failed response; codes live in `crate::error::rpc_codes`
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    /// Numeric code
    pub code: i32,
    /// Human-readable reason
    pub message: String,
}

/// `initialize` result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Negotiated protocol version
    pub protocol_version: String,
    /// Only `tools` is advertised
    pub capabilities: ServerCapabilities,
    /// Name and version of this server
    pub server_info: Info,
    /// Usage hint shown to the model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// `tools/list` result; the catalog is small enough to return in one page
#[derive(Debug, Clone, Serialize)]
pub struct ToolsListResult {
    /// Auth tools followed by the Fitbit catalog
    pub tools: Vec<Tool>,
}

/// `tools/call` result
///
/// Tool failures are reported here with `is_error` set, not as JSON-RPC errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCallResult {
    /// A single text item holding the JSON payload
    pub content: Vec<Content>,
    /// Set when the payload describes a failure
    #[serde(default)]
    pub is_error: bool,
}
