//! MCP tool dispatch
//!
//! Maps JSON-RPC methods onto the credential tools and the Fitbit catalog.
//! Tool failures become `isError` results; only malformed calls become
//! JSON-RPC errors.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::dispatch_helpers::{
    CHECK_AUTH_STATUS, GET_AUTH_URL, SIGN_OUT, build_initialize_result, build_status_payload, build_tools,
    extract_client_version, extract_tools_call_params, wrap_tool_error, wrap_tool_success, wrap_tool_text,
};
use crate::error::rpc_codes;
use crate::fitbit::{self, FitbitClient};
use crate::oauth::AccessGuard;
use crate::protocol::{JsonRpcResponse, RequestId, Tool, ToolsListResult, negotiate_version};
use crate::Error;

/// Routes MCP requests to tool handlers
pub struct ToolDispatch {
    guard: Arc<AccessGuard>,
    fitbit: FitbitClient,
    tools: Vec<Tool>,
}

impl ToolDispatch {
    /// Create a dispatcher over the access guard and the Fitbit client
    pub fn new(guard: Arc<AccessGuard>, fitbit: FitbitClient) -> Self {
        Self {
            guard,
            fitbit,
            tools: build_tools(),
        }
    }

    /// Handle one JSON-RPC request (notifications are answered by the router)
    pub async fn handle(&self, id: RequestId, method: &str, params: Option<&Value>) -> JsonRpcResponse {
        match method {
            "initialize" => Self::handle_initialize(id, params),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => self.handle_tools_list(id),
            "tools/call" => self.handle_tools_call(id, params).await,
            _ => {
                debug!(method = %method, "Unknown method");
                JsonRpcResponse::error(
                    Some(id),
                    rpc_codes::METHOD_NOT_FOUND,
                    format!("Method not found: {method}"),
                )
            }
        }
    }

    /// Handle initialize request
    pub fn handle_initialize(id: RequestId, params: Option<&Value>) -> JsonRpcResponse {
        let client_version = extract_client_version(params);
        let negotiated = negotiate_version(client_version);

        debug!(client = client_version, negotiated = negotiated, "Version negotiation");

        let result = build_initialize_result(negotiated);
        match serde_json::to_value(result) {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => JsonRpcResponse::error(Some(id), rpc_codes::INTERNAL_ERROR, e.to_string()),
        }
    }

    /// Handle tools/list request
    pub fn handle_tools_list(&self, id: RequestId) -> JsonRpcResponse {
        let result = ToolsListResult {
            tools: self.tools.clone(),
        };
        match serde_json::to_value(result) {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => JsonRpcResponse::error(Some(id), rpc_codes::INTERNAL_ERROR, e.to_string()),
        }
    }

    /// Handle tools/call request
    pub async fn handle_tools_call(&self, id: RequestId, params: Option<&Value>) -> JsonRpcResponse {
        let (tool_name, arguments) = extract_tools_call_params(params);

        match tool_name {
            GET_AUTH_URL => wrap_tool_text(id, self.guard.flow().build_authorization_url()),
            CHECK_AUTH_STATUS => wrap_tool_success(id, &build_status_payload(&self.guard.status())),
            SIGN_OUT => {
                self.guard.sign_out().await;
                info!("Fitbit credential cleared by sign_out");
                wrap_tool_success(id, &json!({"signed_out": true}))
            }
            "" => JsonRpcResponse::error(Some(id), rpc_codes::INVALID_PARAMS, "Missing tool name"),
            name => match fitbit::find(name) {
                Some(endpoint) => match self.fitbit.fetch(endpoint, &arguments).await {
                    Ok(body) => wrap_tool_success(id, &body),
                    Err(Error::InvalidParams(msg)) => {
                        JsonRpcResponse::error(Some(id), rpc_codes::INVALID_PARAMS, msg)
                    }
                    Err(e) => {
                        warn!(
                            tool = name,
                            kind = e.kind(),
                            code = e.to_rpc_code(),
                            error = %e,
                            "Tool call failed"
                        );
                        wrap_tool_error(id, &e)
                    }
                },
                None => JsonRpcResponse::error(
                    Some(id),
                    rpc_codes::METHOD_NOT_FOUND,
                    format!("Unknown tool: {name}"),
                ),
            },
        }
    }
}
