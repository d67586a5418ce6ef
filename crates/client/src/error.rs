//! Error types for the ERP client.

use erp_mcp_schema_tree::SchemaTreeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// Invalid or incomplete client options, or an argument the API cannot accept.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Signing the client assertion or obtaining an access token failed.
    #[error("Auth error: {0}")]
    Auth(String),

    /// The API answered with a non-success status.
    #[error("API returned {status}: {body}")]
    Http { status: u16, body: String },

    /// The request never produced a response (connect, TLS, timeout, body read).
    #[error("Transport error: {0}")]
    Transport(String),

    /// A success response whose body is not what the endpoint promises.
    #[error("Decode error: {0}")]
    Decode(String),

    #[error(transparent)]
    Schema(#[from] SchemaTreeError),
}

impl ClientError {
    /// Whether the API itself answered, as opposed to configuration or transport failures.
    #[must_use]
    pub fn is_http(&self) -> bool {
        matches!(self, Self::Http { .. })
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(sanitize_reqwest_error(&value))
    }
}

impl From<url::ParseError> for ClientError {
    fn from(value: url::ParseError) -> Self {
        Self::Config(format!("invalid URL: {value}"))
    }
}

/// `reqwest` errors embed the full request URL; keep only scheme, host and path.
pub(crate) fn sanitize_reqwest_error(e: &reqwest::Error) -> String {
    let mut msg = e.to_string();
    if let Some(u) = e.url() {
        let mut redacted = u.clone();
        redacted.set_query(None);
        redacted.set_fragment(None);
        let _ = redacted.set_username("");
        let _ = redacted.set_password(None);
        msg = msg.replace(u.as_str(), redacted.as_str());
    }
    msg
}

pub type Result<T> = std::result::Result<T, ClientError>;
