//! Fitbit MCP server

use std::net::SocketAddr;
use std::sync::Arc;

use reqwest::Client;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use super::dispatch::ToolDispatch;
use super::router::{AppState, create_router};
use crate::config::Config;
use crate::fitbit::FitbitClient;
use crate::oauth::{AccessGuard, AuthorizationFlow, CredentialStore};
use crate::{Error, Result};

/// The HTTP server and the credential lifecycle behind it
pub struct Gateway {
    config: Config,
    flow: Arc<AuthorizationFlow>,
    dispatch: Arc<ToolDispatch>,
}

impl Gateway {
    /// Wire up the credential store, authorization flow, guard and dispatcher
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when client credentials are missing or a
    /// configured URL is malformed.
    pub fn new(config: Config) -> Result<Self> {
        let settings = config.oauth_settings()?;
        let timeout = config.fitbit.request_timeout;

        let http_client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {e}")))?;

        let store = Arc::new(CredentialStore::new());
        let flow = Arc::new(AuthorizationFlow::with_http(
            settings,
            store,
            http_client.clone(),
            timeout,
        ));
        let guard = Arc::new(AccessGuard::new(Arc::clone(&flow)));
        let fitbit = FitbitClient::new(http_client, &config.fitbit.api_base_url, Arc::clone(&guard), timeout);
        let dispatch = Arc::new(ToolDispatch::new(guard, fitbit));

        Ok(Self { config, flow, dispatch })
    }

    /// Run until Ctrl-C or SIGTERM
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let state = Arc::new(AppState {
            dispatch: Arc::clone(&self.dispatch),
            flow: Arc::clone(&self.flow),
        });
        let app = create_router(state);

        let listener = TcpListener::bind(addr).await?;

        info!("============================================================");
        info!("FITBIT MCP v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %self.config.server.host, port = %self.config.server.port, "Listening");
        info!(
            "  POST http://{}:{}/mcp  (MCP requests)",
            self.config.server.host, self.config.server.port
        );
        info!("  OAuth redirect URI: {}", self.flow.settings().redirect_uri);
        info!("No Fitbit credential held yet; call get_auth_url to authorize");
        info!("============================================================");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        info!("Server stopped");
        Ok(())
    }
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
