//! Error types for the Fitbit MCP server

use std::io;

use thiserror::Error;

use crate::oauth::AuthError;

/// Result type alias for the Fitbit MCP server
pub type Result<T> = std::result::Result<T, Error>;

/// Fitbit MCP server errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (missing client credentials, bad host, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credential lifecycle error
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Fitbit resource endpoint answered with a non-2xx status
    #[error("Fitbit API returned HTTP {status}: {body}")]
    Upstream {
        /// HTTP status code
        status: u16,
        /// Raw response body
        body: String,
    },

    /// Network failure reaching Fitbit
    #[error("Transport error: {0}")]
    Transport(String),

    /// Tool arguments failed validation
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convert to JSON-RPC error code
    #[must_use]
    pub fn to_rpc_code(&self) -> i32 {
        match self {
            Self::InvalidParams(_) => rpc_codes::INVALID_PARAMS,
            Self::Auth(AuthError::NotAuthenticated) => rpc_codes::NOT_AUTHENTICATED,
            Self::Auth(_) | Self::Upstream { .. } | Self::Transport(_) => rpc_codes::SERVER_ERROR_START,
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => rpc_codes::INTERNAL_ERROR,
        }
    }

    /// Short machine-readable kind, used in tool error payloads
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::Auth(AuthError::NotAuthenticated) => "not_authenticated",
            Self::Auth(AuthError::UpstreamRejected { .. }) => "token_rejected",
            Self::Auth(AuthError::Transport(_)) | Self::Transport(_) => "transport_error",
            Self::Upstream { .. } => "upstream_error",
            Self::InvalidParams(_) => "invalid_params",
            Self::Io(_) | Self::Internal(_) => "internal_error",
        }
    }
}

/// Standard JSON-RPC error codes
pub mod rpc_codes {
    /// Parse error - Invalid JSON
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid Request - Not a valid Request object
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Server error range start
    pub const SERVER_ERROR_START: i32 = -32000;
    /// No Fitbit credential; the user must authorize first
    pub const NOT_AUTHENTICATED: i32 = -32001;
}
