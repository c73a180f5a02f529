//! Error types for Entangle Core.

use thiserror::Error;

/// Errors raised while decoding messages or declaring schemas.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("decoding error: {0}")]
    Decoding(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("wire message must be a JSON object")]
    NotAnObject,

    #[error("message is missing required field {0}")]
    MissingField(&'static str),

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("{sync_type} message is missing primary key {key}")]
    MissingPrimaryKey { sync_type: String, key: String },
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Decoding(e.to_string())
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
