//! Error types for the connection manager.

use thiserror::Error;

use entangle_core::{CoreError, ResponseError};

/// Errors that can occur while talking to the server.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Message could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CoreError),

    /// Connection URL is malformed or uses an unsupported scheme.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Establishing a connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Transport-level error on an established connection.
    #[error("transport error: {0}")]
    TransportError(String),

    /// No connection is open.
    #[error("not connected")]
    NotConnected,

    /// The manager was closed.
    #[error("manager closed")]
    Closed,

    /// A correlated request did not succeed.
    #[error(transparent)]
    Response(#[from] ResponseError),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
