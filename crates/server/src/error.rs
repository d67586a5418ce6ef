//! Error types for the MCP server.

use erp_mcp_client::ClientError;
use thiserror::Error;

/// JSON-RPC 2.0 error codes used by the stdio transport.
pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

#[derive(Error, Debug)]
pub enum ServerError {
    /// Missing or invalid startup configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ServerError {
    /// JSON-RPC error code for failures reported as protocol errors.
    #[must_use]
    pub fn code(&self) -> i64 {
        match self {
            Self::UnknownTool(_) => INVALID_PARAMS,
            Self::Config(_) | Self::Client(_) | Self::Io(_) | Self::Json(_) => INTERNAL_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
