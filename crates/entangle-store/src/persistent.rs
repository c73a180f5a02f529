//! Persistent types.
//!
//! A persistent type keeps one live instance per primary key in a
//! [`StorageMap`]. Inbound messages are merged into the stored instance, and
//! a `delete` removes it again.
//!
//! The free functions here build the outbound messages persistent entities
//! send on their own behalf.

use entangle_core::{fields, EntityHandle, Operation};
use entangle_sync::{Response, SendOptions, SyncError, SyncManager};

use crate::class::{ClassContext, Synchronizable};
use crate::error::Result;
use crate::storage::{message_storage_key, StorageMap};

/// Behavior with an identity map keyed by primary key.
#[derive(Debug, Clone, Default)]
pub struct Persistent {
    storage: StorageMap,
}

impl Persistent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing map, e.g. one shared by several types.
    pub fn with_storage(storage: StorageMap) -> Self {
        Self { storage }
    }
}

impl Synchronizable for Persistent {
    fn storage(&self) -> Option<&StorageMap> {
        Some(&self.storage)
    }

    fn construct(&self, cx: &ClassContext<'_>) -> Result<EntityHandle> {
        lookup_or_create(&self.storage, cx)
    }
}

/// Return the stored instance for the message's key, creating and storing
/// a fresh one on a miss.
pub fn lookup_or_create(storage: &StorageMap, cx: &ClassContext<'_>) -> Result<EntityHandle> {
    let key = message_storage_key(cx.schema(), cx.message())?;
    Ok(storage.get_or_insert_with(key, || cx.class().create()))
}

fn send(
    manager: &SyncManager,
    entity: &EntityHandle,
    operation: Operation,
    attributes: Vec<String>,
) -> Result<Response> {
    let message = entity
        .read()
        .to_sync(Some(&attributes))
        .with_operation(operation);
    let response = manager
        .synchronize(message, SendOptions::new().with_response())?
        .ok_or(SyncError::NotConnected)?;
    Ok(response)
}

fn push_unique(attributes: &mut Vec<String>, name: &str) {
    if !attributes.iter().any(|a| a == name) {
        attributes.push(name.to_string());
    }
}

/// Send local modifications with operation `forward`.
///
/// Carries the modified attributes, the primary keys and the owner.
pub fn sync_update(manager: &SyncManager, entity: &EntityHandle) -> Result<Response> {
    let attributes = {
        let entity = entity.read();
        let mut attributes = entity.sync_modified();
        for key in entity.schema().primary_keys() {
            push_unique(&mut attributes, key);
        }
        push_unique(&mut attributes, fields::OWNER);
        attributes
    };
    send(manager, entity, Operation::Forward, attributes)
}

/// Ask the server to create the object with operation `create`.
///
/// The instance the server's answer is merged into is the stored one, not
/// necessarily `entity`.
pub fn sync_create(manager: &SyncManager, entity: &EntityHandle) -> Result<Response> {
    let attributes = {
        let mut attributes = entity.read().sync_modified();
        push_unique(&mut attributes, fields::OWNER);
        attributes
    };
    send(manager, entity, Operation::Create, attributes)
}

/// Ask the server to delete the object.
pub fn sync_delete(manager: &SyncManager, entity: &EntityHandle) -> Result<Response> {
    let attributes = entity.read().schema().primary_keys().to_vec();
    send(manager, entity, Operation::Delete, attributes)
}
