//! Error types for the client.

use entangle_core::{CoreError, ResponseError};
use entangle_owner::OwnerError;
use entangle_store::StoreError;
use entangle_sync::SyncError;
use entangle_views::ViewError;
use thiserror::Error;

/// Errors that can occur during client operations.
#[derive(Debug, Error)]
pub enum EntangleError {
    /// Wire or schema error.
    #[error("codec error: {0}")]
    Core(#[from] CoreError),

    /// Connection error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Registry error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Owner setup error.
    #[error("owner error: {0}")]
    Owner(#[from] OwnerError),

    /// View setup error.
    #[error("view error: {0}")]
    View(#[from] ViewError),

    /// The server rejected a request, or it was never answered.
    #[error("response error: {0}")]
    Response(#[from] ResponseError),

    /// No type registered under this name.
    #[error("unregistered type: {0}")]
    UnregisteredType(String),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, EntangleError>;
