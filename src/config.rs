//! Configuration management

use std::fmt;
use std::path::Path;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::oauth::OAuthSettings;
use crate::{Error, Result};

/// Credential variables read without the `FITBIT_MCP_` prefix
const CREDENTIAL_VARS: &[&str] = &["FITBIT_CLIENT_ID", "FITBIT_CLIENT_SECRET", "FITBIT_REDIRECT_URI"];

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Fitbit client and API configuration
    pub fitbit: FitbitConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Fitbit OAuth client and Web API configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FitbitConfig {
    /// OAuth client id (`FITBIT_CLIENT_ID`)
    pub client_id: Option<String>,
    /// OAuth client secret (`FITBIT_CLIENT_SECRET`)
    pub client_secret: Option<String>,
    /// Registered redirect URI (`FITBIT_REDIRECT_URI`), required
    pub redirect_uri: Option<String>,
    /// Authorization page
    pub authorize_url: String,
    /// Token endpoint
    pub token_url: String,
    /// Web API base URL
    pub api_base_url: String,
    /// Timeout for every token and resource request
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Requested access token lifetime, in seconds
    pub token_lifetime_hint: u64,
}

impl Default for FitbitConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            authorize_url: "https://www.fitbit.com/oauth2/authorize".to_string(),
            token_url: "https://api.fitbit.com/oauth2/token".to_string(),
            api_base_url: "https://api.fitbit.com".to_string(),
            request_timeout: Duration::from_secs(30),
            token_lifetime_hint: 604_800,
        }
    }
}

impl fmt::Debug for FitbitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FitbitConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("redirect_uri", &self.redirect_uri)
            .field("authorize_url", &self.authorize_url)
            .field("token_url", &self.token_url)
            .field("api_base_url", &self.api_base_url)
            .field("request_timeout", &self.request_timeout)
            .field("token_lifetime_hint", &self.token_lifetime_hint)
            .finish()
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// Later sources win: YAML file, `PORT`, `FITBIT_MCP_*` variables
    /// (`__` separates nesting), then the `FITBIT_CLIENT_ID`,
    /// `FITBIT_CLIENT_SECRET` and `FITBIT_REDIRECT_URI` credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment
            .merge(Env::raw().only(&["PORT"]).map(|_| "server.port".into()))
            .merge(Env::prefixed("FITBIT_MCP_").split("__"))
            .merge(
                Env::raw()
                    .only(CREDENTIAL_VARS)
                    .map(|key| format!("fitbit.{}", key.as_str().to_ascii_lowercase().trim_start_matches("fitbit_")).into()),
            );

        figment.extract().map_err(|e| Error::Config(e.to_string()))
    }

    /// Validated OAuth settings
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when the client id, secret or redirect URI is
    /// missing, or a configured URL does not parse.
    pub fn oauth_settings(&self) -> Result<OAuthSettings> {
        let client_id = required(self.fitbit.client_id.as_deref(), "FITBIT_CLIENT_ID")?;
        let client_secret = required(self.fitbit.client_secret.as_deref(), "FITBIT_CLIENT_SECRET")?;

        let redirect_uri = required(self.fitbit.redirect_uri.as_deref(), "FITBIT_REDIRECT_URI")?;
        parse_url("redirect_uri", &redirect_uri)?;

        Ok(OAuthSettings {
            client_id,
            client_secret,
            redirect_uri,
            authorize_url: parse_url("authorize_url", &self.fitbit.authorize_url)?,
            token_url: parse_url("token_url", &self.fitbit.token_url)?,
            token_lifetime_hint: self.fitbit.token_lifetime_hint,
        })
    }
}

fn required(value: Option<&str>, name: &str) -> Result<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(Error::Config(format!("{name} is not set"))),
    }
}

fn parse_url(field: &str, raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| Error::Config(format!("Invalid {field} '{raw}': {e}")))
}
