//! Fitbit resource client

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use super::catalog::Endpoint;
use crate::oauth::AccessGuard;
use crate::{Error, Result};

/// Calls Fitbit resource endpoints with a guard-issued bearer token
pub struct FitbitClient {
    http_client: Client,
    api_base: String,
    guard: Arc<AccessGuard>,
    request_timeout: Duration,
}

impl FitbitClient {
    /// Create a client for the given API base (e.g. `https://api.fitbit.com`)
    pub fn new(
        http_client: Client,
        api_base: impl Into<String>,
        guard: Arc<AccessGuard>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            http_client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            guard,
            request_timeout,
        }
    }

    /// Absolute URL for a rendered endpoint path
    fn url_for(&self, endpoint: &Endpoint, path: &str) -> String {
        format!("{}/{}/user/-/{}", self.api_base, endpoint.version.as_str(), path)
    }

    /// Fetch an endpoint and return its JSON body untouched
    ///
    /// Arguments are validated before a token is requested, so a bad date
    /// never costs a refresh or a network round trip.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidParams` for bad arguments
    /// - `Error::Auth` when no valid credential can be produced
    /// - `Error::Upstream` for a non-2xx answer
    /// - `Error::Transport` when Fitbit cannot be reached in time
    pub async fn fetch(&self, endpoint: &Endpoint, args: &Value) -> Result<Value> {
        let path = endpoint.render_path(args)?;
        let url = self.url_for(endpoint, &path);
        let token = self.guard.get_valid_access_token().await?;

        debug!(tool = endpoint.tool, url = %url, "Calling Fitbit API");

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(token)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        if !status.is_success() {
            warn!(tool = endpoint.tool, status = status.as_u16(), "Fitbit API request failed");
            return Err(Error::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|_| Error::Upstream {
            status: status.as_u16(),
            body,
        })
    }
}
