//! Authorization flow
//!
//! Builds the Fitbit authorization URL, redeems authorization codes, and
//! refreshes the stored credential. Refreshes are single-flight: Fitbit
//! invalidates a refresh token the moment it is used, so two racing
//! refreshes would leave the loser holding a dead token. Concurrent callers
//! join the one in-flight refresh and all receive its outcome.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use reqwest::Client;
use tracing::{debug, info, warn};
use url::Url;

use super::AuthError;
use super::endpoint::{HttpTokenEndpoint, TokenEndpoint, TokenGrant, TokenResponse};
use super::storage::CredentialStore;

/// Scopes requested on every authorization
pub const SCOPES: &[&str] = &[
    "sleep",
    "heartrate",
    "activity",
    "profile",
    "weight",
    "nutrition",
    "oxygen_saturation",
    "respiratory_rate",
    "temperature",
    "cardio_fitness",
    "settings",
];

/// Validated OAuth client settings
#[derive(Clone)]
pub struct OAuthSettings {
    /// Registered client id
    pub client_id: String,
    /// Registered client secret
    pub client_secret: String,
    /// Registered redirect URI
    pub redirect_uri: String,
    /// Authorization page (`/oauth2/authorize`)
    pub authorize_url: Url,
    /// Token endpoint (`/oauth2/token`)
    pub token_url: Url,
    /// Requested token lifetime hint, in seconds
    pub token_lifetime_hint: u64,
}

impl fmt::Debug for OAuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("authorize_url", &self.authorize_url.as_str())
            .field("token_url", &self.token_url.as_str())
            .field("token_lifetime_hint", &self.token_lifetime_hint)
            .finish()
    }
}

impl OAuthSettings {
    /// Authorization URL the user opens in a browser
    pub fn authorization_url(&self) -> String {
        let mut url = self.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", &SCOPES.join(" "))
            .append_pair("expires_in", &self.token_lifetime_hint.to_string());
        url.into()
    }
}

type SharedRefresh = Shared<BoxFuture<'static, Result<(), AuthError>>>;

/// Whether a refresh may be skipped when the record turned fresh meanwhile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshMode {
    Always,
    IfExpired,
}

/// OAuth authorization flow for the single Fitbit credential
pub struct AuthorizationFlow {
    settings: OAuthSettings,
    store: Arc<CredentialStore>,
    endpoint: Arc<dyn TokenEndpoint>,
    request_timeout: Duration,
    /// Serializes every store write (code exchange and refresh)
    write_gate: Arc<tokio::sync::Mutex<()>>,
    /// The refresh currently in flight, if any
    inflight: Arc<Mutex<Option<SharedRefresh>>>,
}

impl AuthorizationFlow {
    /// Create a flow over an arbitrary token endpoint
    pub fn new(
        settings: OAuthSettings,
        store: Arc<CredentialStore>,
        endpoint: Arc<dyn TokenEndpoint>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            settings,
            store,
            endpoint,
            request_timeout,
            write_gate: Arc::new(tokio::sync::Mutex::new(())),
            inflight: Arc::new(Mutex::new(None)),
        }
    }

    /// Create a flow that talks to the configured token URL over HTTP
    pub fn with_http(
        settings: OAuthSettings,
        store: Arc<CredentialStore>,
        http_client: Client,
        request_timeout: Duration,
    ) -> Self {
        let endpoint = HttpTokenEndpoint::new(
            http_client,
            settings.token_url.as_str(),
            &settings.client_id,
            &settings.client_secret,
        );
        Self::new(settings, store, Arc::new(endpoint), request_timeout)
    }

    /// Settings this flow was built with
    pub fn settings(&self) -> &OAuthSettings {
        &self.settings
    }

    /// Store this flow writes to
    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Authorization URL the user opens in a browser
    pub fn build_authorization_url(&self) -> String {
        self.settings.authorization_url()
    }

    /// Redeem an authorization code and store the resulting credential
    ///
    /// On failure the store is left as it was.
    pub async fn exchange_authorization_code(&self, code: &str) -> Result<(), AuthError> {
        let grant = TokenGrant::AuthorizationCode {
            code: code.to_string(),
            redirect_uri: self.settings.redirect_uri.clone(),
        };

        let _write = self.write_gate.lock().await;
        let response = request_with_timeout(self.endpoint.as_ref(), &grant, self.request_timeout).await?;
        let record = response.into_record(Utc::now());
        info!(subject = %record.subject_id, "Fitbit authorization completed");
        self.store.save(record);
        Ok(())
    }

    /// Exchange the stored refresh token for a new credential
    ///
    /// Fails with [`AuthError::NotAuthenticated`] when nothing is stored.
    /// Joins the in-flight refresh if there is one.
    pub async fn refresh_token(&self) -> Result<(), AuthError> {
        self.join_or_start(RefreshMode::Always).await
    }

    /// Refresh only if the stored credential is still expired once it is
    /// this caller's turn to write
    pub async fn refresh_if_expired(&self) -> Result<(), AuthError> {
        self.join_or_start(RefreshMode::IfExpired).await
    }

    /// Whether a refresh is currently in flight
    pub fn refresh_in_flight(&self) -> bool {
        self.inflight.lock().is_some()
    }

    async fn join_or_start(&self, mode: RefreshMode) -> Result<(), AuthError> {
        let refresh = {
            let mut slot = self.inflight.lock();
            if let Some(existing) = slot.as_ref() {
                debug!("Joining in-flight token refresh");
                existing.clone()
            } else {
                let started = self.start_refresh(mode);
                *slot = Some(started.clone());
                started
            }
        };
        refresh.await
    }

    /// Spawn the refresh and return a shared handle to its outcome
    ///
    /// The refresh runs on its own task, so it completes, releases the write
    /// gate and clears its slot even when every waiter has been dropped.
    fn start_refresh(&self, mode: RefreshMode) -> SharedRefresh {
        let store = Arc::clone(&self.store);
        let endpoint = Arc::clone(&self.endpoint);
        let write_gate = Arc::clone(&self.write_gate);
        let slot = Arc::clone(&self.inflight);
        let task_slot = Arc::clone(&self.inflight);
        let timeout = self.request_timeout;

        let task = tokio::spawn(async move {
            let result = {
                let _write = write_gate.lock().await;
                run_refresh(&store, endpoint.as_ref(), timeout, mode).await
            };
            task_slot.lock().take();
            result
        });

        async move {
            task.await.unwrap_or_else(|e| {
                // A panicked task never reached its own cleanup.
                slot.lock().take();
                Err(AuthError::Transport(format!("Token refresh task failed: {e}")))
            })
        }
        .boxed()
        .shared()
    }

    /// Forget the stored credential
    ///
    /// Waits for any exchange or refresh holding the write gate, so a
    /// refresh that was in flight cannot restore the record afterwards.
    pub async fn clear(&self) {
        let _write = self.write_gate.lock().await;
        self.store.clear();
    }
}

async fn run_refresh(
    store: &CredentialStore,
    endpoint: &dyn TokenEndpoint,
    timeout: Duration,
    mode: RefreshMode,
) -> Result<(), AuthError> {
    let current = store.get().ok_or(AuthError::NotAuthenticated)?;

    if mode == RefreshMode::IfExpired && !current.is_expired_at(Utc::now()) {
        debug!("Credential already refreshed by another writer");
        return Ok(());
    }

    let grant = TokenGrant::RefreshToken {
        refresh_token: current.refresh_token,
    };

    match request_with_timeout(endpoint, &grant, timeout).await {
        Ok(response) => {
            let record = response.into_record(Utc::now());
            info!(subject = %record.subject_id, expires_at = %record.expires_at, "Fitbit token refreshed");
            store.save(record);
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "Fitbit token refresh failed, keeping previous credential");
            Err(e)
        }
    }
}

async fn request_with_timeout(
    endpoint: &dyn TokenEndpoint,
    grant: &TokenGrant,
    timeout: Duration,
) -> Result<TokenResponse, AuthError> {
    tokio::time::timeout(timeout, endpoint.request_token(grant))
        .await
        .map_err(|_| AuthError::Transport(format!("Token request timed out after {timeout:?}")))?
}
