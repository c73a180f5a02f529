//! # Entangle Store
//!
//! Typed-object registry for Entangle.
//!
//! ## Overview
//!
//! The registry turns inbound wire messages into shared entities. For every
//! message it looks up (or creates) the instance the message describes,
//! merges the message into it, and announces the result through lifecycle
//! events. Persistent types keep one live instance per primary key, so the
//! same server object always maps to the same [`EntityHandle`].
//!
//! ## Key Types
//!
//! - [`Registry`] - Schemas, behaviors, inbound routing, registry events
//! - [`Synchronizable`] - Per-type behavior (construct, receive, delete)
//! - [`Transient`] / [`Persistent`] - The two stock behaviors
//! - [`EventBus`] / [`SyncEvent`] - Lifecycle events
//! - [`perform_transition`] - Optimistic updates with rollback
//!
//! ## Inbound Flow
//!
//! ```text
//! message ─> construct ─> receive (merge) ─> "receive" on registry
//!                                         └─> operation event on registry, then on type
//! ```
//!
//! [`EntityHandle`]: entangle_core::EntityHandle

pub mod class;
pub mod error;
pub mod events;
pub mod persistent;
pub mod registry;
pub mod storage;
pub mod transition;

pub use class::{ClassContext, SyncClass, Synchronizable, Transient};
pub use error::{Result, StoreError};
pub use events::{EventBus, EventContext, Handler, SubscriptionId, SyncEvent};
pub use persistent::{lookup_or_create, sync_create, sync_delete, sync_update, Persistent};
pub use registry::Registry;
pub use storage::{message_storage_key, StorageMap};
pub use transition::{
    default_transition_attributes, perform_transition, RandomTransitionIds, SeededTransitionIds,
    TransitionIdSource,
};
