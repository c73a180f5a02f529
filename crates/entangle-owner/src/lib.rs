//! # Entangle Owner
//!
//! Ownership-based invalidation for Entangle.
//!
//! ## Overview
//!
//! Server objects belong to owners. An owner's `epoch` identifies the
//! lineage of its data: when it changes, every object the client holds for
//! that owner is stale. This crate registers the owner types and keeps the
//! local identity maps consistent with them:
//!
//! - an epoch change clears the owner's objects (they *disappear*);
//! - deleting an owner clears its objects first;
//! - `MyOwners` lists the owners the client may keep, dropping the rest;
//! - `YouHave` resets the serial the client reports back in `IHave`.
//!
//! ## Usage
//!
//! ```rust
//! use entangle_owner::{declare_internal_schema, setup_persistence};
//! use entangle_store::Registry;
//!
//! let registry = Registry::new();
//! declare_internal_schema(&registry).unwrap();
//! setup_persistence(&registry).unwrap();
//! ```

pub mod error;
pub mod messages;
pub mod owner;
pub mod setup;

pub use error::{OwnerError, Result};
pub use messages::{MyOwners, YouHave, I_HAVE, MY_OWNERS, YOU_HAVE};
pub use owner::{
    clear_owned, i_have, incoming_serial, owner_storage, set_incoming_serial, SyncOwner, EPOCH,
    INCOMING_SERIAL, SYNC_OWNER,
};
pub use setup::{declare_internal_schema, register_owner_type, setup_persistence};
