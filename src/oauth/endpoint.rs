//! Fitbit token endpoint
//!
//! Both grants (authorization code and refresh token) go to the same
//! endpoint with HTTP Basic client authentication and a form body.

use std::fmt;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use reqwest::{Client, header::AUTHORIZATION};
use serde::Deserialize;
use tracing::{debug, warn};

use super::AuthError;
use super::storage::CredentialRecord;

/// A grant posted to the token endpoint
#[derive(Clone, PartialEq, Eq)]
pub enum TokenGrant {
    /// `grant_type=authorization_code`
    AuthorizationCode {
        /// Code received on the redirect callback
        code: String,
        /// Registered redirect URI (must match the authorize request)
        redirect_uri: String,
    },
    /// `grant_type=refresh_token`
    RefreshToken {
        /// The refresh token being consumed
        refresh_token: String,
    },
}

impl TokenGrant {
    /// `grant_type` value
    pub fn grant_type(&self) -> &'static str {
        match self {
            Self::AuthorizationCode { .. } => "authorization_code",
            Self::RefreshToken { .. } => "refresh_token",
        }
    }

    /// Form body fields, in wire order
    pub fn form(&self) -> Vec<(&'static str, &str)> {
        match self {
            Self::AuthorizationCode { code, redirect_uri } => vec![
                ("grant_type", self.grant_type()),
                ("code", code.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
            ],
            Self::RefreshToken { refresh_token } => vec![
                ("grant_type", self.grant_type()),
                ("refresh_token", refresh_token.as_str()),
            ],
        }
    }
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("grant_type", &self.grant_type())
            .finish_non_exhaustive()
    }
}

/// Fields consumed from a successful token response
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct TokenResponse {
    /// New access token
    pub access_token: String,
    /// New refresh token (the consumed one is now invalid)
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    /// Fitbit user id
    pub user_id: String,
}

impl TokenResponse {
    /// Turn the response into a full record, with expiry anchored at `now`
    pub fn into_record(self, now: DateTime<Utc>) -> CredentialRecord {
        CredentialRecord::from_grant(
            self.access_token,
            self.refresh_token,
            self.expires_in,
            self.user_id,
            now,
        )
    }
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("expires_in", &self.expires_in)
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

/// Anything that can redeem a [`TokenGrant`]
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Post the grant and parse the resulting token pair
    async fn request_token(&self, grant: &TokenGrant) -> Result<TokenResponse, AuthError>;
}

/// `Authorization` header value for client authentication
pub fn basic_auth_header(client_id: &str, client_secret: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{client_id}:{client_secret}")))
}

/// reqwest-backed token endpoint
pub struct HttpTokenEndpoint {
    http_client: Client,
    token_url: String,
    authorization: String,
}

impl HttpTokenEndpoint {
    /// Create a token endpoint client
    ///
    /// `http_client` should carry a finite timeout.
    pub fn new(http_client: Client, token_url: impl Into<String>, client_id: &str, client_secret: &str) -> Self {
        Self {
            http_client,
            token_url: token_url.into(),
            authorization: basic_auth_header(client_id, client_secret),
        }
    }
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    async fn request_token(&self, grant: &TokenGrant) -> Result<TokenResponse, AuthError> {
        debug!(grant_type = grant.grant_type(), url = %self.token_url, "Requesting Fitbit token");

        let response = self
            .http_client
            .post(&self.token_url)
            .header(AUTHORIZATION, &self.authorization)
            .form(&grant.form())
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Transport(format!("Failed to read token response: {e}")))?;

        if !status.is_success() {
            warn!(grant_type = grant.grant_type(), status = status.as_u16(), "Token request rejected");
            return Err(AuthError::UpstreamRejected {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            warn!(grant_type = grant.grant_type(), error = %e, "Malformed token response");
            AuthError::UpstreamRejected {
                status: status.as_u16(),
                body,
            }
        })
    }
}
