//! Strong type definitions for Entangle.
//!
//! Identifiers are newtypes to prevent misuse at compile time.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Process-unique identity of an [`Entity`](crate::Entity) instance.
///
/// Two handles to the same instance share an `EntityId`; a detached clone
/// gets a fresh one. Derived views key their side tables by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

static NEXT_ENTITY_ID: AtomicU64 = AtomicU64::new(1);

impl EntityId {
    /// Allocate the next identity.
    pub fn next() -> Self {
        Self(NEXT_ENTITY_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity-map key computed from an entity's primary-key values.
///
/// A single key is the JSON encoding of its value; a compound key is the JSON
/// encoding of the value array. Encoding keeps `1` and `"1"` distinct.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StorageKey(String);

impl StorageKey {
    /// Build a key from primary-key values in declaration order.
    pub fn from_values(values: &[&Value]) -> Self {
        match values {
            [single] => Self(single.to_string()),
            many => Self(Value::Array(many.iter().map(|v| (*v).clone()).collect()).to_string()),
        }
    }

    /// Build a key by looking up each primary key name.
    ///
    /// Returns `None` when any key is missing or null.
    pub fn lookup<'a, F>(keys: &[String], mut get: F) -> Option<Self>
    where
        F: FnMut(&str) -> Option<&'a Value>,
    {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            match get(key) {
                Some(Value::Null) | None => return None,
                Some(value) => values.push(value),
            }
        }
        Some(Self::from_values(&values))
    }

    /// Get the encoded key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageKey({})", self.0)
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Single-use identifier of an optimistic transition.
///
/// Rendered as a version 4 UUID string on the wire.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransitionId(String);

impl TransitionId {
    /// Generate a random identifier.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Build an identifier from 16 bytes of entropy.
    ///
    /// The version and variant bits are forced so the result is a valid v4 UUID.
    pub fn from_random_bytes(bytes: [u8; 16]) -> Self {
        Self(uuid::Builder::from_random_bytes(bytes).into_uuid().to_string())
    }

    /// Wrap an identifier received from the wire.
    pub fn from_wire(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TransitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransitionId({})", self.0)
    }
}

impl fmt::Display for TransitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
