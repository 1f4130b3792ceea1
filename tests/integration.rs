//! Integration tests for the Fitbit MCP server

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use chrono::{TimeDelta, Utc};
use fitbit_mcp::fitbit::FitbitClient;
use fitbit_mcp::gateway::{AppState, ToolDispatch, create_router};
use fitbit_mcp::oauth::{AccessGuard, AuthorizationFlow, CredentialRecord, CredentialStore, OAuthSettings};
use fitbit_mcp::protocol::{
    JsonRpcResponse, PROTOCOL_VERSION, RequestId, SUPPORTED_VERSIONS, negotiate_version,
};
use mockito::{Server, ServerGuard};
use pretty_assertions::assert_eq;
use reqwest::Client;
use serde_json::{Value, json};
use tower::ServiceExt;
use url::Url;

struct Harness {
    app: Router,
    store: Arc<CredentialStore>,
}

/// Full router with token and resource endpoints both served by `server`
fn harness(server: &ServerGuard) -> Harness {
    let settings = OAuthSettings {
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        redirect_uri: "http://localhost:3000/callback".to_string(),
        authorize_url: Url::parse("https://www.fitbit.com/oauth2/authorize").unwrap(),
        token_url: Url::parse(&format!("{}/oauth2/token", server.url())).unwrap(),
        token_lifetime_hint: 604_800,
    };
    let store = Arc::new(CredentialStore::new());
    let flow = Arc::new(AuthorizationFlow::with_http(
        settings,
        Arc::clone(&store),
        Client::new(),
        Duration::from_secs(5),
    ));
    let guard = Arc::new(AccessGuard::new(Arc::clone(&flow)));
    let fitbit = FitbitClient::new(Client::new(), server.url(), Arc::clone(&guard), Duration::from_secs(5));
    let app = create_router(Arc::new(AppState {
        dispatch: Arc::new(ToolDispatch::new(guard, fitbit)),
        flow,
    }));
    Harness { app, store }
}

async fn rpc(app: &Router, body: Value) -> Value {
    let response = app
        .clone()
        .oneshot(
            Request::post("/mcp")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap()
}

async fn call_tool(app: &Router, name: &str, arguments: Value) -> (Value, bool) {
    let response = rpc(
        app,
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {"name": name, "arguments": arguments}
        }),
    )
    .await;
    let result = &response["result"];
    let text = result["content"][0]["text"].as_str().unwrap();
    let payload = serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()));
    (payload, result["isError"].as_bool().unwrap_or(false))
}

fn record(access: &str, expires_in_secs: i64) -> CredentialRecord {
    CredentialRecord {
        access_token: access.to_string(),
        refresh_token: "R1".to_string(),
        expires_at: Utc::now() + TimeDelta::seconds(expires_in_secs),
        subject_id: "ABC123".to_string(),
    }
}

#[test]
fn test_version_negotiation() {
    assert!(SUPPORTED_VERSIONS.contains(&PROTOCOL_VERSION));
    assert_eq!(negotiate_version("2024-11-05"), "2024-11-05");
    assert_eq!(negotiate_version("unknown"), PROTOCOL_VERSION);
}

#[test]
fn test_json_rpc_response_serialization() {
    let success = serde_json::to_value(JsonRpcResponse::success(RequestId::String("a".to_string()), json!({})))
        .unwrap();
    assert_eq!(success, json!({"jsonrpc": "2.0", "id": "a", "result": {}}));

    let failure = serde_json::to_value(JsonRpcResponse::error(Some(RequestId::Number(3)), -32601, "nope")).unwrap();
    assert_eq!(
        failure,
        json!({"jsonrpc": "2.0", "id": 3, "error": {"code": -32601, "message": "nope"}})
    );
}

#[tokio::test]
async fn initialize_then_list_tools() {
    let server = Server::new_async().await;
    let h = harness(&server);

    let init = rpc(
        &h.app,
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {"protocolVersion": "2025-03-26", "clientInfo": {"name": "test", "version": "0"}}
        }),
    )
    .await;
    assert_eq!(init["result"]["protocolVersion"], "2025-03-26");
    assert_eq!(init["result"]["serverInfo"]["name"], "fitbit-mcp");

    let list = rpc(&h.app, json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})).await;
    let names: Vec<&str> = list["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"get_auth_url"));
    assert!(names.contains(&"check_auth_status"));
    assert!(names.contains(&"get_sleep_range"));
}

#[tokio::test]
async fn tool_call_without_credential_reports_not_authenticated() {
    let server = Server::new_async().await;
    let h = harness(&server);

    let (payload, is_error) = call_tool(&h.app, "get_sleep", json!({})).await;
    assert!(is_error);
    assert_eq!(payload["error"], "not_authenticated");

    let (status, is_error) = call_tool(&h.app, "check_auth_status", json!({})).await;
    assert!(!is_error);
    assert_eq!(status["state"], "unauthenticated");
}

#[tokio::test]
async fn tool_call_returns_fitbit_payload() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/1/user/-/activities/heart/date/today/1d.json")
        .match_header("authorization", "Bearer A1")
        .with_status(200)
        .with_body(r#"{"activities-heart":[{"dateTime":"2024-03-01","value":{"restingHeartRate":58}}]}"#)
        .create_async()
        .await;

    let h = harness(&server);
    h.store.save(record("A1", 3600));

    let (payload, is_error) = call_tool(&h.app, "get_heart_rate", json!({})).await;
    assert!(!is_error);
    assert_eq!(payload["activities-heart"][0]["value"]["restingHeartRate"], 58);
    mock.assert_async().await;
}

#[tokio::test]
async fn expiring_credential_is_refreshed_before_resource_call() {
    let mut server = Server::new_async().await;
    let token = server
        .mock("POST", "/oauth2/token")
        .with_status(200)
        .with_body(
            r#"{"access_token":"A2","refresh_token":"R2","expires_in":28800,"user_id":"ABC123"}"#,
        )
        .expect(1)
        .create_async()
        .await;
    let resource = server
        .mock("GET", "/1/user/-/profile.json")
        .match_header("authorization", "Bearer A2")
        .with_status(200)
        .with_body(r#"{"user":{"encodedId":"ABC123"}}"#)
        .create_async()
        .await;

    let h = harness(&server);
    h.store.save(record("A1", 30));

    let (payload, is_error) = call_tool(&h.app, "get_profile", json!({})).await;
    assert!(!is_error);
    assert_eq!(payload["user"]["encodedId"], "ABC123");
    token.assert_async().await;
    resource.assert_async().await;
    assert_eq!(h.store.get().unwrap().access_token, "A2");
}

#[tokio::test]
async fn upstream_failure_is_error_result_with_status() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/1/user/-/devices.json")
        .with_status(403)
        .with_body(r#"{"errors":[{"errorType":"insufficient_scope"}]}"#)
        .create_async()
        .await;

    let h = harness(&server);
    h.store.save(record("A1", 3600));

    let (payload, is_error) = call_tool(&h.app, "get_devices", json!({})).await;
    assert!(is_error);
    assert_eq!(payload["error"], "upstream_error");
    assert_eq!(payload["status"], 403);
    assert!(payload["body"].as_str().unwrap().contains("insufficient_scope"));
}

#[tokio::test]
async fn callback_route_completes_authorization() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/oauth2/token")
        .with_status(200)
        .with_body(
            r#"{"access_token":"A1","refresh_token":"R1","expires_in":28800,"user_id":"ABC123"}"#,
        )
        .create_async()
        .await;

    let h = harness(&server);
    let response = h
        .app
        .clone()
        .oneshot(Request::get("/callback?code=abc").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(h.store.get().unwrap().access_token, "A1");

    let (status, _) = call_tool(&h.app, "check_auth_status", json!({})).await;
    assert_eq!(status["state"], "valid");
    assert_eq!(status["subject_id"], "ABC123");
}

#[tokio::test]
async fn failed_code_exchange_is_server_error_page() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/oauth2/token")
        .with_status(400)
        .with_body(r#"{"errors":[{"errorType":"invalid_grant"}]}"#)
        .create_async()
        .await;

    let h = harness(&server);
    let response = h
        .app
        .clone()
        .oneshot(Request::get("/callback?code=stale").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(h.store.get().is_none());
}
