//! Identity maps.
//!
//! A persistent type keeps exactly one live instance per storage key. The
//! registry looks instances up here before merging, so every message about
//! the same object lands on the same [`EntityHandle`].

use std::collections::HashMap;
use std::sync::Arc;

use entangle_core::{CoreError, EntityHandle, Schema, StorageKey, WireMessage};
use parking_lot::RwLock;
use serde_json::Value;

/// Storage key → live instance. Cloning shares the map.
#[derive(Clone, Default)]
pub struct StorageMap {
    inner: Arc<RwLock<HashMap<StorageKey, EntityHandle>>>,
}

impl StorageMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &StorageKey) -> Option<EntityHandle> {
        self.inner.read().get(key).cloned()
    }

    /// Look up by primary-key values in declaration order.
    pub fn find(&self, values: &[&Value]) -> Option<EntityHandle> {
        self.get(&StorageKey::from_values(values))
    }

    pub fn contains(&self, key: &StorageKey) -> bool {
        self.inner.read().contains_key(key)
    }

    /// Return the instance under `key`, creating it with `create` on a miss.
    pub fn get_or_insert_with<F>(&self, key: StorageKey, create: F) -> EntityHandle
    where
        F: FnOnce() -> EntityHandle,
    {
        if let Some(existing) = self.get(&key) {
            return existing;
        }
        self.inner.write().entry(key).or_insert_with(create).clone()
    }

    /// Store `entity` under `key`, returning the instance it replaced.
    pub fn insert(&self, key: StorageKey, entity: EntityHandle) -> Option<EntityHandle> {
        self.inner.write().insert(key, entity)
    }

    pub fn remove(&self, key: &StorageKey) -> Option<EntityHandle> {
        self.inner.write().remove(key)
    }

    /// Snapshot of every live instance.
    pub fn values(&self) -> Vec<EntityHandle> {
        self.inner.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Whether both handles share one map.
    pub fn ptr_eq(&self, other: &StorageMap) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for StorageMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageMap").field("len", &self.len()).finish()
    }
}

/// Storage key of the object a message describes.
///
/// Fails with the first primary key the message lacks.
pub fn message_storage_key(schema: &Schema, message: &WireMessage) -> Result<StorageKey, CoreError> {
    if let Some(missing) = schema
        .primary_keys()
        .iter()
        .find(|key| message.get(key).map_or(true, Value::is_null))
    {
        return Err(CoreError::MissingPrimaryKey {
            sync_type: schema.name().to_string(),
            key: missing.clone(),
        });
    }
    schema
        .storage_key(|name| message.get(name))
        .ok_or_else(|| CoreError::InvalidSchema(format!("{} declares no primary keys", schema.name())))
}
