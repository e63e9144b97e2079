//! Error types for the edge storage engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug)]
pub enum GraphError {
    /// Malformed scope, identifier or search criteria. Raised before any I/O.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The column store could not be reached. Never retried here.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Broken internal invariant, e.g. no shard group covers a timestamp.
    #[error("Invariant violation: {0}")]
    Invariant(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Background pool is saturated.
    #[error("Task rejected: {0}")]
    Rejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Invalid key format: {0}")]
    InvalidFormat(String),
}

impl GraphError {
    /// Stable error code for logs and callers that match on strings.
    pub fn code(&self) -> &'static str {
        match self {
            GraphError::Validation(_) => "VALIDATION",
            GraphError::Connection(_) => "CONNECTION",
            GraphError::Invariant(_) => "INVARIANT",
            GraphError::Config(_) => "CONFIG",
            GraphError::Rejected(_) => "REJECTED",
            GraphError::Io(_) => "IO",
            GraphError::Serialization(_) => "SERIALIZATION",
            GraphError::Json(_) => "JSON",
            GraphError::Index(_) => "INDEX",
            GraphError::InvalidFormat(_) => "INVALID_FORMAT",
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, GraphError::Validation(_))
    }

    pub fn is_invariant(&self) -> bool {
        matches!(self, GraphError::Invariant(_))
    }
}

impl From<sled::Error> for GraphError {
    fn from(e: sled::Error) -> Self {
        match e {
            sled::Error::Io(io) => GraphError::Connection(format!("sled io: {}", io)),
            other => GraphError::Index(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(GraphError::Validation("x".into()).code(), "VALIDATION");
        assert_eq!(GraphError::Invariant("x".into()).code(), "INVARIANT");
        assert!(GraphError::Validation("x".into()).is_validation());
        assert!(!GraphError::Connection("x".into()).is_invariant());
    }

    #[test]
    fn test_display_includes_message() {
        let err = GraphError::Config("minDelta too small".into());
        assert_eq!(err.to_string(), "Invalid configuration: minDelta too small");
    }
}
