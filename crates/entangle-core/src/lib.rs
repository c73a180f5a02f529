//! # Entangle Core
//!
//! Pure primitives for Entangle: wire messages, schemas, entities and snapshots.
//!
//! This crate contains no I/O and no networking. It describes what travels
//! over the wire and how a single entity absorbs it.
//!
//! ## Key Types
//!
//! - [`WireMessage`] - A JSON object exchanged with the server
//! - [`Schema`] - Declared shape of a synchronized type
//! - [`Entity`] / [`EntityHandle`] - A synchronized object and its shared handle
//! - [`Snapshot`] - Attribute values as of the last merge
//! - [`Reply`] / [`ResponseError`] - Outcome of a correlated request
//!
//! ## Merge Model
//!
//! A merge applies every non-reserved key of an inbound message onto the
//! entity and replaces the snapshot atomically with the union of the previous
//! snapshot and the applied values. If the entity has a transition in flight
//! whose id differs from the message's, the transition's tracked attributes
//! are rolled back first. See [`entity`].

pub mod entity;
pub mod error;
pub mod message;
pub mod reply;
pub mod schema;
pub mod types;

pub use entity::{Entity, EntityHandle, Snapshot, TransitionState};
pub use error::{CoreError, Result};
pub use message::{fields, Operation, WireMessage, FLAG_RESPONSE_REQUESTED, RESERVED_PREFIX};
pub use reply::{Reply, ResponseError, TransitionPromise};
pub use schema::{Schema, SchemaDocument, SchemaItem};
pub use types::{EntityId, StorageKey, TransitionId};
