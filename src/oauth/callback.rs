//! OAuth redirect callback
//!
//! Completes authorization when Fitbit redirects the user's browser back
//! with an authorization code, and renders a small result page.

use axum::http::StatusCode;
use axum::response::Html;
use html_escape::encode_text;
use serde::Deserialize;
use tracing::{debug, error, warn};

use super::client::AuthorizationFlow;

/// OAuth callback query parameters
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    /// Authorization code
    pub code: Option<String>,

    /// Error code
    pub error: Option<String>,

    /// Error description
    pub error_description: Option<String>,
}

/// Redeem the callback's code and build the page shown to the user
pub async fn complete_authorization(
    flow: &AuthorizationFlow,
    params: CallbackParams,
) -> (StatusCode, Html<String>) {
    debug!(has_code = params.code.is_some(), error = ?params.error, "Received OAuth callback");

    if let Some(error) = params.error {
        let description = params
            .error_description
            .unwrap_or_else(|| "Authorization was denied or failed".to_string());
        warn!(error = %error, "Fitbit authorization returned an error");
        return (StatusCode::BAD_REQUEST, Html(error_page(&error, &description)));
    }

    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Html(error_page("missing_code", "Authorization code not provided")),
        );
    };

    match flow.exchange_authorization_code(&code).await {
        Ok(()) => (StatusCode::OK, Html(success_page())),
        Err(e) => {
            error!(error = %e, "Token exchange failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(error_page("token_exchange_failed", "Could not obtain a Fitbit token")),
            )
        }
    }
}

fn success_page() -> String {
    r#"<!DOCTYPE html>
<html>
<head>
    <title>Fitbit Authorization Successful</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            text-align: center;
            padding: 50px;
        }
    </style>
</head>
<body>
    <h1>Authorization Successful</h1>
    <p>You can close this window and return to your assistant.</p>
</body>
</html>"#
        .to_string()
}

fn error_page(error: &str, description: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Fitbit Authorization Failed</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            text-align: center;
            padding: 50px;
        }}
        .error-code {{ font-family: monospace; opacity: 0.7; }}
    </style>
</head>
<body>
    <h1>Authorization Failed</h1>
    <p>{}</p>
    <p class="error-code">Error: {}</p>
</body>
</html>"#,
        encode_text(description),
        encode_text(error)
    )
}
