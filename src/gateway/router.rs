//! HTTP router and handlers

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde_json::{Value, json};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::debug;

use super::dispatch::ToolDispatch;
use super::dispatch_helpers::{is_notification_method, parse_request};
use crate::error::rpc_codes;
use crate::oauth::{AuthorizationFlow, CallbackParams, complete_authorization};
use crate::protocol::JsonRpcResponse;

/// Shared application state
pub struct AppState {
    /// MCP tool dispatcher
    pub dispatch: Arc<ToolDispatch>,
    /// Authorization flow, for the OAuth redirect callback
    pub flow: Arc<AuthorizationFlow>,
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/mcp", post(mcp_handler).get(mcp_get_handler))
        // Same handler under the path older client configs point at
        .route("/sse", post(mcp_handler).get(mcp_get_handler))
        .route("/callback", get(callback_handler))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// GET /callback - OAuth redirect target
async fn callback_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> (StatusCode, Html<String>) {
    complete_authorization(&state.flow, params).await
}

/// GET /mcp - this server keeps no sessions, so there is no SSE stream to open
async fn mcp_get_handler() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({
            "jsonrpc": "2.0",
            "error": {
                "code": rpc_codes::INVALID_REQUEST,
                "message": "Streaming not supported. Use POST to send JSON-RPC requests"
            },
            "id": null
        })),
    )
}

fn rpc_response(status: StatusCode, response: &JsonRpcResponse) -> Response {
    match serde_json::to_value(response) {
        Ok(body) => (status, Json(body)).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

/// POST /mcp - stateless Streamable HTTP, one JSON-RPC message per request
async fn mcp_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            let response =
                JsonRpcResponse::error(None, rpc_codes::PARSE_ERROR, format!("Invalid JSON: {e}"));
            return rpc_response(StatusCode::BAD_REQUEST, &response);
        }
    };

    let (id, method, params) = match parse_request(&request) {
        Ok(parsed) => parsed,
        Err(response) => return rpc_response(StatusCode::BAD_REQUEST, &response),
    };

    debug!(method = %method, "MCP request");

    // Notifications (no id) get 202 Accepted with an empty body
    if is_notification_method(&method) {
        debug!(notification = %method, "Handling notification");
        return StatusCode::ACCEPTED.into_response();
    }

    let Some(id) = id else {
        let response = JsonRpcResponse::error(None, rpc_codes::INVALID_REQUEST, "Missing id");
        return rpc_response(StatusCode::BAD_REQUEST, &response);
    };

    let response = state.dispatch.handle(id, &method, params.as_ref()).await;
    rpc_response(StatusCode::OK, &response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitbit::FitbitClient;
    use crate::oauth::{AccessGuard, CredentialStore, OAuthSettings};
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use pretty_assertions::assert_eq;
    use reqwest::Client;
    use std::time::Duration;
    use tower::ServiceExt;
    use url::Url;

    fn app() -> Router {
        let settings = OAuthSettings {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "http://localhost:3000/callback".to_string(),
            authorize_url: Url::parse("https://www.fitbit.com/oauth2/authorize").unwrap(),
            token_url: Url::parse("http://127.0.0.1:9/oauth2/token").unwrap(),
            token_lifetime_hint: 604_800,
        };
        let store = Arc::new(CredentialStore::new());
        let flow = Arc::new(AuthorizationFlow::with_http(
            settings,
            store,
            Client::new(),
            Duration::from_secs(1),
        ));
        let guard = Arc::new(AccessGuard::new(Arc::clone(&flow)));
        let fitbit = FitbitClient::new(
            Client::new(),
            "http://127.0.0.1:9",
            Arc::clone(&guard),
            Duration::from_secs(1),
        );
        create_router(Arc::new(AppState {
            dispatch: Arc::new(ToolDispatch::new(guard, fitbit)),
            flow,
        }))
    }

    async fn post(path: &str, body: &str) -> (StatusCode, Vec<u8>) {
        let response = app()
            .oneshot(
                Request::post(path)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value =
            serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
        assert_eq!(body["status"], "ok");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn invalid_json_is_parse_error() {
        let (status, body) = post("/mcp", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"]["code"], rpc_codes::PARSE_ERROR);
    }

    #[tokio::test]
    async fn notification_is_accepted() {
        let (status, body) =
            post("/mcp", r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn sse_path_serves_same_handler() {
        let (status, body) = post("/sse", r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#).await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert!(body["result"]["tools"].as_array().unwrap().len() > 20);
    }

    #[tokio::test]
    async fn get_mcp_is_method_not_allowed() {
        let response = app()
            .oneshot(Request::get("/mcp").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn callback_without_code_is_bad_request() {
        let response = app()
            .oneshot(Request::get("/callback").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app()
            .oneshot(
                Request::get("/callback?error=access_denied&error_description=denied")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
