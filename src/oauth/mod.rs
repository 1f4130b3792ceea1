//! Fitbit OAuth 2.0 credential lifecycle
//!
//! Obtains, caches, and refreshes the single Fitbit credential this server
//! holds, and hands out access tokens that are valid at the time of use.
//!
//! Components:
//! - [`CredentialStore`]: the in-memory credential record and its expiry rule
//! - [`AuthorizationFlow`]: authorization URL, code exchange, single-flight refresh
//! - [`AccessGuard`]: the only way upstream calls get an access token
//! - [`TokenEndpoint`]: the token endpoint seam, [`HttpTokenEndpoint`] in production

mod callback;
mod client;
mod endpoint;
mod guard;
mod storage;

use thiserror::Error;

pub use callback::{CallbackParams, complete_authorization};
pub use client::{AuthorizationFlow, OAuthSettings, SCOPES};
pub use endpoint::{HttpTokenEndpoint, TokenEndpoint, TokenGrant, TokenResponse, basic_auth_header};
pub use guard::{AccessGuard, AuthStatus};
pub use storage::{CredentialRecord, CredentialStore, EXPIRY_MARGIN_SECS};

/// Credential lifecycle errors
///
/// `Clone` so that every caller joined on one in-flight refresh receives
/// the same outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No credential is stored; the user has to authorize first
    #[error("Not authenticated with Fitbit. Call get_auth_url and complete authorization first.")]
    NotAuthenticated,

    /// The token endpoint answered non-2xx, or 2xx with an unusable body
    #[error("Fitbit token endpoint rejected the request: HTTP {status} - {body}")]
    UpstreamRejected {
        /// HTTP status code
        status: u16,
        /// Raw response body
        body: String,
    },

    /// The token endpoint could not be reached, or the request timed out
    #[error("Token request failed: {0}")]
    Transport(String),
}
