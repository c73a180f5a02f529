//! Error types for derived views.

use thiserror::Error;

use entangle_store::StoreError;

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0} is not persistent")]
    NotPersistent(String),

    #[error("relationship keys {keys:?} do not match the primary keys of {remote}")]
    KeyMismatch { remote: String, keys: Vec<String> },

    #[error("expected a {expected}, got a {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("{0} has no complete primary key")]
    MissingRemoteKey(String),
}

pub type Result<T> = std::result::Result<T, ViewError>;
