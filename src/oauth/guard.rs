//! Access guard
//!
//! The single choke point for upstream credentials: every Fitbit resource
//! call asks the guard for a token, and the guard refreshes on demand.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use super::AuthError;
use super::client::AuthorizationFlow;

/// Credential state as reported to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AuthStatus {
    /// No credential stored
    Unauthenticated,
    /// Credential usable as-is
    Valid {
        /// Fitbit user id
        subject_id: String,
        /// Access token expiry
        expires_at: DateTime<Utc>,
    },
    /// Credential inside the expiry margin; the next call refreshes it
    Expiring {
        /// Fitbit user id
        subject_id: String,
        /// Access token expiry
        expires_at: DateTime<Utc>,
    },
}

/// Hands out access tokens that are valid at the time of the call
pub struct AccessGuard {
    flow: Arc<AuthorizationFlow>,
}

impl AccessGuard {
    /// Create a guard over an authorization flow
    pub fn new(flow: Arc<AuthorizationFlow>) -> Self {
        Self { flow }
    }

    /// The underlying authorization flow
    pub fn flow(&self) -> &Arc<AuthorizationFlow> {
        &self.flow
    }

    /// A currently valid access token, refreshing first if needed
    pub async fn get_valid_access_token(&self) -> Result<String, AuthError> {
        let store = self.flow.store();

        if store.is_expired() {
            debug!("Fitbit credential absent or expiring, refreshing before use");
            self.flow.refresh_if_expired().await?;
        }

        store
            .get()
            .map(|record| record.access_token)
            .ok_or(AuthError::NotAuthenticated)
    }

    /// Current credential state
    pub fn status(&self) -> AuthStatus {
        let now = Utc::now();
        match self.flow.store().get() {
            None => AuthStatus::Unauthenticated,
            Some(record) if record.is_expired_at(now) => AuthStatus::Expiring {
                subject_id: record.subject_id,
                expires_at: record.expires_at,
            },
            Some(record) => AuthStatus::Valid {
                subject_id: record.subject_id,
                expires_at: record.expires_at,
            },
        }
    }

    /// Forget the stored credential, after any refresh already in flight
    pub async fn sign_out(&self) {
        self.flow.clear().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::{CredentialRecord, CredentialStore, OAuthSettings, TokenEndpoint, TokenGrant, TokenResponse};
    use async_trait::async_trait;
    use chrono::TimeDelta;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;
    use url::Url;

    struct ScriptedEndpoint {
        calls: AtomicUsize,
        reject: bool,
    }

    #[async_trait]
    impl TokenEndpoint for ScriptedEndpoint {
        async fn request_token(&self, _grant: &TokenGrant) -> Result<TokenResponse, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            if self.reject {
                return Err(AuthError::UpstreamRejected {
                    status: 401,
                    body: r#"{"errors":[{"errorType":"invalid_token"}]}"#.to_string(),
                });
            }
            Ok(TokenResponse {
                access_token: "A2".to_string(),
                refresh_token: "R2".to_string(),
                expires_in: 28_800,
                user_id: "ABC123".to_string(),
            })
        }
    }

    fn guard(reject: bool) -> (AccessGuard, Arc<CredentialStore>, Arc<ScriptedEndpoint>) {
        let settings = OAuthSettings {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "http://localhost:3000/callback".to_string(),
            authorize_url: Url::parse("https://www.fitbit.com/oauth2/authorize").unwrap(),
            token_url: Url::parse("https://api.fitbit.com/oauth2/token").unwrap(),
            token_lifetime_hint: 604_800,
        };
        let store = Arc::new(CredentialStore::new());
        let endpoint = Arc::new(ScriptedEndpoint {
            calls: AtomicUsize::new(0),
            reject,
        });
        let flow = AuthorizationFlow::new(
            settings,
            Arc::clone(&store),
            Arc::clone(&endpoint) as Arc<dyn TokenEndpoint>,
            Duration::from_secs(5),
        );
        (AccessGuard::new(Arc::new(flow)), store, endpoint)
    }

    fn record(expires_in_secs: i64) -> CredentialRecord {
        CredentialRecord {
            access_token: "A1".to_string(),
            refresh_token: "R1".to_string(),
            expires_at: Utc::now() + TimeDelta::seconds(expires_in_secs),
            subject_id: "ABC123".to_string(),
        }
    }

    #[tokio::test]
    async fn empty_store_is_not_authenticated() {
        let (guard, _store, endpoint) = guard(false);
        assert_eq!(guard.get_valid_access_token().await, Err(AuthError::NotAuthenticated));
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fresh_token_needs_no_network() {
        let (guard, store, endpoint) = guard(false);
        store.save(record(3600));

        assert_eq!(guard.get_valid_access_token().await.unwrap(), "A1");
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn token_inside_margin_is_refreshed_once() {
        let (guard, store, endpoint) = guard(false);
        store.save(record(30));

        assert_eq!(guard.get_valid_access_token().await.unwrap(), "A2");
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 1);

        let stored = store.get().unwrap();
        assert_eq!(stored.access_token, "A2");
        assert_eq!(stored.refresh_token, "R2");
    }

    #[tokio::test]
    async fn rejected_refresh_keeps_old_record() {
        let (guard, store, _endpoint) = guard(true);
        store.save(record(30));

        let err = guard.get_valid_access_token().await.unwrap_err();
        assert!(matches!(err, AuthError::UpstreamRejected { status: 401, .. }));
        assert_eq!(store.get().unwrap().access_token, "A1");
        assert!(store.is_expired());
    }

    #[tokio::test]
    async fn concurrent_callers_trigger_one_refresh() {
        let (guard, store, endpoint) = guard(false);
        store.save(record(10));
        let guard = Arc::new(guard);

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let guard = Arc::clone(&guard);
                tokio::spawn(async move { guard.get_valid_access_token().await })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), "A2");
        }
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn status_follows_lifecycle() {
        let (guard, store, _endpoint) = guard(false);
        assert_eq!(guard.status(), AuthStatus::Unauthenticated);

        store.save(record(3600));
        assert!(matches!(guard.status(), AuthStatus::Valid { .. }));

        store.save(record(30));
        assert!(matches!(guard.status(), AuthStatus::Expiring { .. }));

        guard.sign_out().await;
        assert_eq!(guard.status(), AuthStatus::Unauthenticated);
    }

    /// Token endpoint double that parks each request until released
    #[derive(Default)]
    struct GatedEndpoint {
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl TokenEndpoint for GatedEndpoint {
        async fn request_token(&self, _grant: &TokenGrant) -> Result<TokenResponse, AuthError> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(TokenResponse {
                access_token: "A2".to_string(),
                refresh_token: "R2".to_string(),
                expires_in: 28_800,
                user_id: "ABC123".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn sign_out_during_refresh_stays_signed_out() {
        let store = Arc::new(CredentialStore::new());
        store.save(record(30));
        let endpoint = Arc::new(GatedEndpoint::default());
        let flow = AuthorizationFlow::new(
            OAuthSettings {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
                redirect_uri: "http://localhost:3000/callback".to_string(),
                authorize_url: Url::parse("https://www.fitbit.com/oauth2/authorize").unwrap(),
                token_url: Url::parse("https://api.fitbit.com/oauth2/token").unwrap(),
                token_lifetime_hint: 604_800,
            },
            Arc::clone(&store),
            Arc::clone(&endpoint) as Arc<dyn TokenEndpoint>,
            Duration::from_secs(5),
        );
        let guard = Arc::new(AccessGuard::new(Arc::new(flow)));

        let refreshing = {
            let guard = Arc::clone(&guard);
            tokio::spawn(async move { guard.get_valid_access_token().await })
        };
        endpoint.started.notified().await;

        let signing_out = {
            let guard = Arc::clone(&guard);
            tokio::spawn(async move { guard.sign_out().await })
        };
        tokio::task::yield_now().await;
        assert!(!signing_out.is_finished());

        endpoint.release.notify_one();
        assert_eq!(refreshing.await.unwrap().unwrap(), "A2");
        signing_out.await.unwrap();

        assert!(store.get().is_none());
        assert_eq!(guard.status(), AuthStatus::Unauthenticated);
    }

    #[test]
    fn status_serializes_with_state_tag() {
        let value = serde_json::to_value(AuthStatus::Unauthenticated).unwrap();
        assert_eq!(value, serde_json::json!({"state": "unauthenticated"}));
    }
}
