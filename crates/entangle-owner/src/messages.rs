//! Owner bookkeeping messages from the server.

use std::collections::HashSet;

use entangle_core::{EntityHandle, StorageKey};
use entangle_store::{ClassContext, Result, Synchronizable};
use serde_json::Value;
use tracing::{debug, error};

use crate::owner::{as_serial, owner_storage, set_incoming_serial};

/// Client → server: the last serial held for an owner.
pub const I_HAVE: &str = "IHave";
/// Server → client: the serial the client should consider current.
pub const YOU_HAVE: &str = "YouHave";
/// Server → client: the complete list of owners the client may keep.
pub const MY_OWNERS: &str = "MyOwners";

/// Sets the named owner's incoming serial.
#[derive(Debug, Clone, Copy, Default)]
pub struct YouHave;

impl Synchronizable for YouHave {
    fn receive(&self, cx: &ClassContext<'_>, entity: &EntityHandle) -> Result<()> {
        cx.merge(entity);

        let (owner_key, serial) = {
            let message = entity.read();
            (
                message.owner().cloned(),
                message.get("serial").and_then(as_serial),
            )
        };
        let owner = owner_key.as_ref().and_then(|key| {
            owner_storage(cx.registry())?.get(&StorageKey::from_values(&[key]))
        });
        match (owner, serial) {
            (Some(owner), Some(serial)) => {
                debug!(owner = %owner.id(), serial, "YouHave");
                set_incoming_serial(&owner, serial);
            }
            (Some(owner), None) => error!(owner = %owner.id(), "YouHave without a serial"),
            (None, _) => error!(owner = ?owner_key, "YouHave for unknown owner"),
        }
        Ok(())
    }
}

/// Deletes every known owner missing from `owners`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MyOwners;

impl Synchronizable for MyOwners {
    fn receive(&self, cx: &ClassContext<'_>, entity: &EntityHandle) -> Result<()> {
        cx.merge(entity);

        let keep: HashSet<StorageKey> = entity
            .get("owners")
            .as_ref()
            .and_then(Value::as_array)
            .map(|owners| {
                owners
                    .iter()
                    .map(|owner| StorageKey::from_values(&[owner]))
                    .collect()
            })
            .unwrap_or_default();

        let Some(storage) = owner_storage(cx.registry()) else {
            return Ok(());
        };
        for owner in storage.values() {
            let (key, sync_type) = {
                let owner = owner.read();
                (owner.storage_key(), owner.sync_type().to_string())
            };
            if key.map_or(false, |key| keep.contains(&key)) {
                continue;
            }
            let Some(class) = cx.registry().class(&sync_type) else {
                continue;
            };
            debug!(owner = %owner.id(), "owner no longer listed");
            class
                .behavior()
                .persist_delete(&cx.for_class(&class), &owner, true)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::owner::{incoming_serial, EPOCH, SYNC_OWNER};
    use crate::setup::{declare_internal_schema, register_owner_type, setup_persistence};
    use entangle_core::{fields, WireMessage};
    use entangle_store::{Persistent, Registry};
    use serde_json::json;

    fn registry() -> Registry {
        let registry = Registry::new();
        declare_internal_schema(&registry).unwrap();
        setup_persistence(&registry).unwrap();
        registry.declare("Team", ["id"], ["id", EPOCH]).unwrap();
        register_owner_type(&registry, "Team").unwrap();
        registry.declare("Doc", ["id"], ["id"]).unwrap();
        registry.register("Doc", Persistent::new()).unwrap();
        registry
    }

    fn receive(registry: &Registry, message: WireMessage) -> EntityHandle {
        registry.sync_receive(&message, None).unwrap()
    }

    #[test]
    fn test_you_have_sets_serial() {
        let registry = registry();
        let owner = receive(
            &registry,
            WireMessage::new(SYNC_OWNER).with("id", json!("o1")).with(EPOCH, json!(1)),
        );
        receive(
            &registry,
            WireMessage::new(YOU_HAVE)
                .with("serial", json!(42))
                .with(EPOCH, json!(1))
                .with(fields::OWNER, json!("o1")),
        );
        assert_eq!(incoming_serial(&owner), 42);
    }

    #[test]
    fn test_you_have_for_unknown_owner_is_ignored() {
        let registry = registry();
        let message = WireMessage::new(YOU_HAVE)
            .with("serial", json!(1))
            .with(EPOCH, json!(1))
            .with(fields::OWNER, json!("nobody"));
        assert!(registry.sync_receive(&message, None).is_ok());
    }

    #[test]
    fn test_my_owners_drops_unlisted_owners() {
        let registry = registry();
        for (sync_type, id) in [(SYNC_OWNER, "o1"), ("Team", "t1"), (SYNC_OWNER, "o2")] {
            receive(
                &registry,
                WireMessage::new(sync_type).with("id", json!(id)).with(EPOCH, json!(1)),
            );
        }
        receive(
            &registry,
            WireMessage::new("Doc").with("id", json!("d")).with(fields::OWNER, json!("t1")),
        );

        receive(&registry, WireMessage::new(MY_OWNERS).with("owners", json!(["o1"])));

        assert!(registry.find(SYNC_OWNER, &[&json!("o1")]).is_some());
        assert!(registry.find(SYNC_OWNER, &[&json!("o2")]).is_none());
        assert!(registry.find("Team", &[&json!("t1")]).is_none());
        assert!(registry.find("Doc", &[&json!("d")]).is_none());
    }
}
