//! Per-type behavior.
//!
//! A registered type pairs a [`Schema`] with a [`Synchronizable`] behavior
//! and its own [`EventBus`]. Behaviors are composed rather than inherited:
//! the defaults here give the base behavior, [`Persistent`](crate::Persistent)
//! adds an identity map, and owner types override merging and deletion.

use std::fmt;
use std::sync::Arc;

use entangle_core::{Entity, EntityHandle, Schema, TransitionId, WireMessage};
use entangle_sync::SyncManager;
use tracing::debug;

use crate::error::Result;
use crate::events::{EventBus, EventContext, SyncEvent};
use crate::registry::Registry;
use crate::storage::StorageMap;

/// Behavior of a synchronized type.
///
/// Every method has a default; implement only what differs.
pub trait Synchronizable: Send + Sync + 'static {
    /// Identity map of a persistent type. `None` for transient types.
    fn storage(&self) -> Option<&StorageMap> {
        None
    }

    /// Produce the instance an inbound message is merged into.
    ///
    /// The default creates a fresh instance.
    fn construct(&self, cx: &ClassContext<'_>) -> Result<EntityHandle> {
        Ok(EntityHandle::new(Entity::new(Arc::clone(cx.schema()))))
    }

    /// Merge an inbound message into `entity`.
    fn receive(&self, cx: &ClassContext<'_>, entity: &EntityHandle) -> Result<()> {
        cx.merge(entity);
        Ok(())
    }

    /// Remove `entity` from the identity map and announce it.
    ///
    /// `disappear` marks a removal the server did not ask for explicitly
    /// (e.g. an owner cascade); it is announced on the registry as well as
    /// on the type.
    fn persist_delete(
        &self,
        cx: &ClassContext<'_>,
        entity: &EntityHandle,
        disappear: bool,
    ) -> Result<()> {
        cx.remove_persisted(self.storage(), entity, disappear);
        Ok(())
    }
}

/// Base behavior: no identity map, plain merge.
#[derive(Debug, Clone, Copy, Default)]
pub struct Transient;

impl Synchronizable for Transient {}

// ─────────────────────────────────────────────────────────────────────────────
// SyncClass
// ─────────────────────────────────────────────────────────────────────────────

struct ClassInner {
    schema: Arc<Schema>,
    behavior: Arc<dyn Synchronizable>,
    events: EventBus,
}

/// A registered type. Cloning shares it.
#[derive(Clone)]
pub struct SyncClass {
    inner: Arc<ClassInner>,
}

impl SyncClass {
    pub(crate) fn new(schema: Arc<Schema>, behavior: Arc<dyn Synchronizable>) -> Self {
        Self {
            inner: Arc::new(ClassInner {
                schema,
                behavior,
                events: EventBus::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.schema.name()
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.inner.schema
    }

    pub fn behavior(&self) -> &dyn Synchronizable {
        self.inner.behavior.as_ref()
    }

    /// Events dispatched for instances of this type.
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn storage(&self) -> Option<&StorageMap> {
        self.inner.behavior.storage()
    }

    pub fn is_persistent(&self) -> bool {
        self.storage().is_some()
    }

    /// A fresh, never-synced instance.
    pub fn create(&self) -> EntityHandle {
        EntityHandle::new(Entity::new(Arc::clone(&self.inner.schema)))
    }

    pub fn ptr_eq(&self, other: &SyncClass) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for SyncClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncClass")
            .field("name", &self.name())
            .field("persistent", &self.is_persistent())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ClassContext
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a behavior needs while handling one message.
pub struct ClassContext<'a> {
    registry: &'a Registry,
    class: &'a SyncClass,
    manager: Option<&'a SyncManager>,
    message: &'a WireMessage,
}

impl<'a> ClassContext<'a> {
    pub fn new(
        registry: &'a Registry,
        class: &'a SyncClass,
        manager: Option<&'a SyncManager>,
        message: &'a WireMessage,
    ) -> Self {
        Self {
            registry,
            class,
            manager,
            message,
        }
    }

    pub fn registry(&self) -> &'a Registry {
        self.registry
    }

    pub fn class(&self) -> &'a SyncClass {
        self.class
    }

    pub fn schema(&self) -> &'a Arc<Schema> {
        self.class.schema()
    }

    pub fn manager(&self) -> Option<&'a SyncManager> {
        self.manager
    }

    /// The message being handled.
    pub fn message(&self) -> &'a WireMessage {
        self.message
    }

    pub fn operation(&self) -> &'a str {
        self.message.operation()
    }

    /// The same message, seen from another type.
    pub fn for_class<'b>(&self, class: &'b SyncClass) -> ClassContext<'b>
    where
        'a: 'b,
    {
        ClassContext {
            registry: self.registry,
            class,
            manager: self.manager,
            message: self.message,
        }
    }

    /// Merge the message into `entity`.
    ///
    /// A transition in flight under a different id is rolled back first,
    /// its shared result fails, and the break is announced as
    /// [`SyncEvent::BrokenTransition`] on the type with no entity lock held.
    /// Returns the superseded id.
    pub fn merge(&self, entity: &EntityHandle) -> Option<TransitionId> {
        let broken = entity.write().break_transition(self.message);
        if let Some(stale) = &broken {
            debug!(sync_type = self.class.name(), entity = %entity.id(), transition = %stale, "transition broken");
            self.class.events().dispatch(&EventContext {
                event: SyncEvent::BrokenTransition,
                entity,
                message: self.message,
                registry: self.registry,
                manager: self.manager,
                stale_transition: Some(stale),
            });
        }
        entity.write().apply(self.message);
        broken
    }

    /// Dispatch `event` for `entity` on the type's bus.
    pub fn dispatch_on_class(&self, event: SyncEvent, entity: &EntityHandle) {
        self.class.events().dispatch(&self.event(event, entity));
    }

    /// Dispatch `event` for `entity` on the registry's bus.
    pub fn dispatch_on_registry(&self, event: SyncEvent, entity: &EntityHandle) {
        self.registry.events().dispatch(&self.event(event, entity));
    }

    /// Drop `entity` from `storage` and announce the disappearance.
    pub fn remove_persisted(
        &self,
        storage: Option<&StorageMap>,
        entity: &EntityHandle,
        disappear: bool,
    ) {
        if let Some(storage) = storage {
            let key = entity.read().storage_key();
            if let Some(key) = key {
                storage.remove(&key);
            }
        }
        if disappear {
            self.dispatch_on_registry(SyncEvent::Disappear, entity);
        }
        self.dispatch_on_class(SyncEvent::Disappear, entity);
    }

    fn event<'e>(&'e self, event: SyncEvent, entity: &'e EntityHandle) -> EventContext<'e> {
        EventContext {
            event,
            entity,
            message: self.message,
            registry: self.registry,
            manager: self.manager,
            stale_transition: None,
        }
    }
}
