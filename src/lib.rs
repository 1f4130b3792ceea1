//! Fitbit MCP Library
//!
//! An MCP (Model Context Protocol) server exposing the Fitbit Web API as
//! read-only tools, with OAuth2 credential brokering.
//!
//! # Features
//!
//! - **Credential lifecycle**: authorization URL, code exchange, in-memory
//!   credential, refresh on demand with at most one refresh in flight
//! - **Endpoint catalog**: sleep, heart rate, activity, body, nutrition and more
//! - **Streamable HTTP**: stateless JSON-RPC over `POST /mcp`
//!
//! # Protocol Version
//!
//! Implements MCP protocol versions 2024-11-05 and 2025-03-26.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod error;
pub mod fitbit;
pub mod gateway;
pub mod oauth;
pub mod protocol;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// `RUST_LOG` takes precedence over `level`. `format` is `json` or text.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    };

    installed.map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {e}")))
}
