//! Error types for the registry.

use thiserror::Error;

use entangle_core::CoreError;
use entangle_sync::SyncError;

/// Errors raised by the registry and entity behaviors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A message or entity was malformed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Sending failed.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// No behavior is registered for the message's type.
    #[error("{0} is not registered")]
    UnregisteredType(String),

    /// A schema with this name was already declared.
    #[error("schema {0} is already declared")]
    AlreadyDeclared(String),

    /// A behavior is already registered for this type.
    #[error("{0} is already registered")]
    AlreadyRegistered(String),

    /// A type does not satisfy what its behavior requires.
    #[error("contract violation: {0}")]
    ContractViolation(String),
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, StoreError>;
