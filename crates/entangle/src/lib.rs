//! # Entangle
//!
//! Client-side object synchronization: a local mirror of server-owned
//! objects kept consistent over one persistent connection, with optimistic
//! updates that roll back when the server disagrees.
//!
//! ## Overview
//!
//! - **Connection**: one manager task per client owns the transport,
//!   reconnects with exponential backoff and correlates responses with
//!   requests by sequence number
//! - **Registry**: declared types, one live instance per primary key,
//!   lifecycle events after every merge
//! - **Transitions**: local changes sent under a transition id and rolled
//!   back if a conflicting update arrives first
//! - **Owners**: objects belong to owners; an owner's epoch change or
//!   deletion clears everything it owned
//! - **Views**: filters and relationships maintained from lifecycle events
//!
//! ## Usage
//!
//! ```rust,no_run
//! use entangle::{Client, ClientConfig, Persistent, Registry, TcpConnector};
//!
//! async fn example() -> entangle::Result<()> {
//!     let registry = Registry::new();
//!     registry.declare("Task", ["id"], ["id", "title", "done"])?;
//!     registry.register("Task", Persistent::new())?;
//!
//!     let client = Client::connect(
//!         ClientConfig::new("tcp://127.0.0.1:9000"),
//!         registry,
//!         TcpConnector,
//!     )?;
//!     client.wait_open().await?;
//!
//!     let task = client.create("Task")?;
//!     task.set("title", "write docs".into());
//!     client.sync_create(&task)?.await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `entangle::core` - messages, schemas and entities
//! - `entangle::sync` - connection manager and transports
//! - `entangle::store` - registry, events and transitions
//! - `entangle::owner` - owner types and invalidation
//! - `entangle::views` - filters and relationships

pub mod client;
pub mod error;

pub use entangle_core as core;
pub use entangle_owner as owner;
pub use entangle_store as store;
pub use entangle_sync as sync;
pub use entangle_views as views;

pub use client::{Client, ClientConfig};
pub use error::{EntangleError, Result};

pub use entangle_core::{
    EntityHandle, Operation, Reply, ResponseError, StorageKey, TransitionId, TransitionPromise,
    WireMessage,
};
pub use entangle_store::{Persistent, Registry, SyncEvent, Synchronizable, Transient};
pub use entangle_sync::{BackoffConfig, ConnectionState, ManagerConfig, TcpConnector};
pub use entangle_views::{
    Filter, FilterOptions, ListFilter, MapFilter, NodeKind, Relationship, RelationshipOptions,
    Remote,
};
