//! Owner entities.
//!
//! Every persistent entity may name an owner in `_sync_owner`. Owners carry
//! an `epoch`; when the server reports a different epoch than the one last
//! merged, everything the owner owned is stale and is cleared from the local
//! identity maps. Deleting an owner clears its objects the same way.
//!
//! After every owner merge the client answers with an `IHave` stating the
//! last serial it holds for that owner.

use entangle_core::{fields, EntityHandle, Operation, WireMessage};
use entangle_store::{
    lookup_or_create, ClassContext, Registry, Result, StorageMap, Synchronizable,
};
use serde_json::Value;
use tracing::{debug, info};

/// Type tag of the owner type.
pub const SYNC_OWNER: &str = "SyncOwner";
/// Owner attribute holding the epoch.
pub const EPOCH: &str = "epoch";
/// Local-only attribute: last serial received for this owner.
pub const INCOMING_SERIAL: &str = "incoming_serial";

/// Behavior of owner types.
///
/// All owner types share one identity map, so an owner id resolves to the
/// same entity whatever type announced it.
#[derive(Debug, Clone, Default)]
pub struct SyncOwner {
    storage: StorageMap,
}

impl SyncOwner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Owner behavior over an existing owner map.
    pub fn sharing(storage: StorageMap) -> Self {
        Self { storage }
    }
}

impl Synchronizable for SyncOwner {
    fn storage(&self) -> Option<&StorageMap> {
        Some(&self.storage)
    }

    fn construct(&self, cx: &ClassContext<'_>) -> Result<EntityHandle> {
        lookup_or_create(&self.storage, cx)
    }

    fn receive(&self, cx: &ClassContext<'_>, entity: &EntityHandle) -> Result<()> {
        let prior_epoch = entity
            .read()
            .snapshot()
            .and_then(|snapshot| snapshot.get(EPOCH).cloned())
            .filter(|epoch| !epoch.is_null());

        cx.merge(entity);

        let epoch = entity.get(EPOCH);
        if let Some(prior) = prior_epoch {
            if epoch.as_ref() != Some(&prior) {
                info!(owner = %entity.id(), prior = %prior, "owner epoch changed");
                clear_owned(cx, entity, &self.storage)?;
                set_incoming_serial(entity, 0);
            }
        }
        if entity.get(INCOMING_SERIAL).is_none() {
            set_incoming_serial(entity, 0);
        }

        match cx.manager() {
            Some(manager) => manager.send(i_have(entity))?,
            None => debug!(owner = %entity.id(), "no manager, IHave not sent"),
        }
        Ok(())
    }

    fn persist_delete(
        &self,
        cx: &ClassContext<'_>,
        entity: &EntityHandle,
        disappear: bool,
    ) -> Result<()> {
        clear_owned(cx, entity, &self.storage)?;
        cx.remove_persisted(Some(&self.storage), entity, disappear);
        Ok(())
    }
}

/// Last serial received for `owner`; 0 when unknown.
pub fn incoming_serial(owner: &EntityHandle) -> u64 {
    owner.get(INCOMING_SERIAL).and_then(|v| as_serial(&v)).unwrap_or(0)
}

pub fn set_incoming_serial(owner: &EntityHandle, serial: u64) {
    owner.set(INCOMING_SERIAL, Value::from(serial));
}

/// Serials may arrive as numbers or numeric strings.
pub(crate) fn as_serial(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// The `IHave` an owner merge is answered with.
pub fn i_have(owner: &EntityHandle) -> WireMessage {
    let owner = owner.read();
    let mut message = WireMessage::new(crate::I_HAVE).with_operation(Operation::Forward);
    if let Some(key) = owner.key_value() {
        message.insert(fields::OWNER, key);
    }
    let serial = owner.get(INCOMING_SERIAL).and_then(as_serial).unwrap_or(0);
    message.insert("serial", Value::from(serial));
    message.insert(EPOCH, owner.get(EPOCH).cloned().unwrap_or(Value::Null));
    message
}

/// Disappear every persistent entity owned by `owner`.
///
/// Other owners are never cleared, even if they name `owner` as theirs.
/// Returns how many entities were removed.
pub fn clear_owned(
    cx: &ClassContext<'_>,
    owner: &EntityHandle,
    owner_storage: &StorageMap,
) -> Result<usize> {
    let Some(owner_key) = owner.read().key_value() else {
        return Ok(0);
    };

    let mut cleared = 0;
    for class in cx.registry().classes() {
        let Some(storage) = class.storage() else {
            continue;
        };
        if storage.ptr_eq(owner_storage) {
            continue;
        }
        let class_cx = cx.for_class(&class);
        for entity in storage.values() {
            if entity.read().owner() != Some(&owner_key) {
                continue;
            }
            class.behavior().persist_delete(&class_cx, &entity, true)?;
            cleared += 1;
        }
    }
    info!(owner = %owner_key, cleared, "cleared owned objects");
    Ok(cleared)
}

/// The identity map shared by owner types, once set up.
pub fn owner_storage(registry: &Registry) -> Option<StorageMap> {
    registry.class(SYNC_OWNER)?.storage().cloned()
}
