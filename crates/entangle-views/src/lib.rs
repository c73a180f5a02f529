//! # Entangle Views
//!
//! Derived views over synchronized types, maintained incrementally from the
//! lifecycle events the registry dispatches.
//!
//! ## Key Types
//!
//! - [`Filter`]: categorizes a type's instances and reports membership
//!   changes to callbacks
//! - [`ListFilter`]: the instances matching a predicate, lazily sorted
//! - [`MapFilter`]: instances grouped by key, one [`MapNode`] per key
//! - [`Relationship`]: navigation between a local and a remote type
//!
//! Every view detaches from its type when closed or dropped.
//!
//! ## Usage
//!
//! ```rust
//! use entangle_store::{Persistent, Registry};
//! use entangle_views::{FilterOptions, ListFilter};
//! use serde_json::json;
//!
//! let registry = Registry::new();
//! registry.declare("Task", ["id"], ["id", "done"]).unwrap();
//! let tasks = registry.register("Task", Persistent::new()).unwrap();
//!
//! let open = ListFilter::new(&tasks, FilterOptions::new(), |task| {
//!     task.get("done") != Some(json!(true))
//! });
//! assert!(open.is_empty());
//! ```

pub mod error;
pub mod filter;
pub mod list;
pub mod map;
pub mod relationship;

#[cfg(test)]
mod test_support;

pub use error::{Result, ViewError};
pub use filter::{Filter, FilterOptions, REMOVE_EVENTS};
pub use list::{ListFilter, Order};
pub use map::{MapFilter, MapNode, NodeKind};
pub use relationship::{Arrival, Cardinality, Placeholder, Relationship, RelationshipOptions, Remote};
