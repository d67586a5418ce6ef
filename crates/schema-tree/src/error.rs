//! Error types for `erp-mcp-schema-tree`.

use thiserror::Error;

/// Main error type for schema tree operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaTreeError {
    /// Malformed or type-mismatched JSON input (including a bad `type` field).
    #[error("Parse error: {0}")]
    Parse(String),

    /// A structurally required field is missing or undeterminable.
    #[error("Schema shape error at '{path}': {message}")]
    Shape { path: String, message: String },

    /// The reference resolver failed, or the reference cannot be resolved.
    #[error("Resolution error: failed to resolve $ref '{reference}': {message}")]
    Resolution { reference: String, message: String },

    /// Failure raised by a caller-supplied visitor.
    #[error("Visitor error: {0}")]
    Visitor(String),
}

impl SchemaTreeError {
    pub(crate) fn shape(path: impl ToString, message: impl Into<String>) -> Self {
        Self::Shape {
            path: path.to_string(),
            message: message.into(),
        }
    }

    /// Build a resolution error for `reference`.
    pub fn unresolved(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Resolution {
            reference: reference.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_resolution(&self) -> bool {
        matches!(self, Self::Resolution { .. })
    }

    #[must_use]
    pub fn is_shape(&self) -> bool {
        matches!(self, Self::Shape { .. })
    }
}

impl From<serde_json::Error> for SchemaTreeError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value.to_string())
    }
}

/// Result type alias for schema tree operations.
pub type Result<T> = std::result::Result<T, SchemaTreeError>;
