//! Error types for owner handling.

use thiserror::Error;

use entangle_store::StoreError;

/// Errors raised while setting up or processing owners.
#[derive(Debug, Error)]
pub enum OwnerError {
    /// Registry operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An internal type was not declared before setup.
    #[error("internal schema {0} is not declared; call declare_internal_schema first")]
    MissingInternalSchema(&'static str),

    /// Owner types share one identity map, which does not exist yet.
    #[error("SyncOwner is not registered; call setup_persistence first")]
    NotSetUp,
}

/// Result type for owner operations.
pub type Result<T> = std::result::Result<T, OwnerError>;
