//! The type registry.
//!
//! A [`Registry`] holds declared schemas and registered behaviors, routes
//! inbound messages to them, and dispatches lifecycle events.
//!
//! ## Declaring and registering
//!
//! Declaration supplies the schema; registration attaches behavior. Types
//! declared but never registered get [`Transient`] behavior when the
//! registry is associated with a manager.
//!
//! ```rust
//! use entangle_store::{Persistent, Registry};
//!
//! let registry = Registry::new();
//! registry.declare("Widget", ["id"], ["id", "color"]).unwrap();
//! registry.declare("Ping", Vec::<String>::new(), ["at"]).unwrap();
//! registry.register("Widget", Persistent::new()).unwrap();
//! registry.finalize();
//! assert!(registry.class("Ping").is_some());
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use entangle_core::{EntityHandle, Reply, Schema, SchemaDocument, StorageKey, WireMessage};
use entangle_sync::{ReceiverId, SyncManager};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::class::{ClassContext, SyncClass, Synchronizable, Transient};
use crate::error::{Result, StoreError};
use crate::events::{EventBus, EventContext, SubscriptionId, SyncEvent};

#[derive(Default)]
struct RegistryInner {
    schemas: RwLock<BTreeMap<String, Arc<Schema>>>,
    classes: RwLock<BTreeMap<String, SyncClass>>,
    events: EventBus,
}

/// Declared schemas, registered behaviors and the registry event bus.
///
/// Cloning shares the registry.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Schemas
    // ─────────────────────────────────────────────────────────────────────

    /// Declare a schema. Declaring a name twice fails.
    pub fn declare<K, A>(&self, name: &str, primary_keys: K, attributes: A) -> Result<Arc<Schema>>
    where
        K: IntoIterator,
        K::Item: Into<String>,
        A: IntoIterator,
        A::Item: Into<String>,
    {
        self.declare_schema(Schema::new(name, primary_keys, attributes)?)
    }

    pub fn declare_schema(&self, schema: Schema) -> Result<Arc<Schema>> {
        let mut schemas = self.inner.schemas.write();
        if schemas.contains_key(schema.name()) {
            return Err(StoreError::AlreadyDeclared(schema.name().to_string()));
        }
        let schema = Arc::new(schema);
        schemas.insert(schema.name().to_string(), Arc::clone(&schema));
        Ok(schema)
    }

    /// Declare every item of a schema document.
    pub fn load_schema(&self, document: &SchemaDocument) -> Result<()> {
        for item in document.items() {
            self.declare_schema(Schema::try_from(item.clone())?)?;
        }
        Ok(())
    }

    /// Parse and declare a JSON schema document.
    pub fn load_schema_json(&self, text: &str) -> Result<()> {
        self.load_schema(&SchemaDocument::from_json(text)?)
    }

    pub fn schema(&self, name: &str) -> Option<Arc<Schema>> {
        self.inner.schemas.read().get(name).cloned()
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.inner.schemas.read().contains_key(name)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Behaviors
    // ─────────────────────────────────────────────────────────────────────

    /// Attach behavior to a declared type.
    ///
    /// Fails if the type is undeclared, already registered, or persistent
    /// without primary keys.
    pub fn register<B: Synchronizable>(&self, name: &str, behavior: B) -> Result<SyncClass> {
        self.register_arc(name, Arc::new(behavior))
    }

    pub fn register_arc(&self, name: &str, behavior: Arc<dyn Synchronizable>) -> Result<SyncClass> {
        let schema = self.schema(name).ok_or_else(|| {
            StoreError::ContractViolation(format!("{name} has no declared schema"))
        })?;
        if behavior.storage().is_some() && schema.primary_keys().is_empty() {
            return Err(StoreError::ContractViolation(format!(
                "{name} is persistent but declares no primary keys"
            )));
        }

        let mut classes = self.inner.classes.write();
        if classes.contains_key(name) {
            return Err(StoreError::AlreadyRegistered(name.to_string()));
        }
        let class = SyncClass::new(schema, behavior);
        classes.insert(name.to_string(), class.clone());
        debug!(sync_type = name, persistent = class.is_persistent(), "registered");
        Ok(class)
    }

    pub fn class(&self, name: &str) -> Option<SyncClass> {
        self.inner.classes.read().get(name).cloned()
    }

    /// Registered types in name order.
    pub fn classes(&self) -> Vec<SyncClass> {
        self.inner.classes.read().values().cloned().collect()
    }

    /// Give every declared but unregistered type the base behavior.
    pub fn finalize(&self) {
        let schemas: Vec<Arc<Schema>> = self.inner.schemas.read().values().cloned().collect();
        let mut classes = self.inner.classes.write();
        for schema in schemas {
            if !classes.contains_key(schema.name()) {
                classes.insert(
                    schema.name().to_string(),
                    SyncClass::new(Arc::clone(&schema), Arc::new(Transient)),
                );
            }
        }
    }

    /// Finalize and route every registered type's messages from `manager`
    /// to this registry.
    pub fn associate(&self, manager: &SyncManager) -> Vec<(String, ReceiverId)> {
        self.finalize();
        self.classes()
            .into_iter()
            .map(|class| {
                let registry = self.clone();
                let name = class.name().to_string();
                let id = manager.on_receive(name.clone(), move |message, cx| {
                    let entity = registry.sync_receive(message, Some(cx.manager()))?;
                    Ok(Reply::Entity(entity))
                });
                (name, id)
            })
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Events
    // ─────────────────────────────────────────────────────────────────────

    /// Registry-wide events.
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn subscribe<F>(&self, event: SyncEvent, handler: F) -> SubscriptionId
    where
        F: Fn(&EventContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.events.subscribe(event, handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Inbound
    // ─────────────────────────────────────────────────────────────────────

    /// Construct-or-lookup, merge and announce one inbound message.
    ///
    /// Dispatches `receive` on the registry, then the operation's lifecycle
    /// event on the registry and on the type. A `delete` first removes the
    /// instance from its identity map.
    pub fn sync_receive(
        &self,
        message: &WireMessage,
        manager: Option<&SyncManager>,
    ) -> Result<EntityHandle> {
        let sync_type = message.require_sync_type()?;
        let class = self
            .class(sync_type)
            .ok_or_else(|| StoreError::UnregisteredType(sync_type.to_string()))?;

        let cx = ClassContext::new(self, &class, manager, message);
        let behavior = class.behavior();
        let entity = behavior.construct(&cx)?;
        behavior.receive(&cx, &entity)?;
        debug!(sync_type, operation = message.operation(), entity = %entity.id(), "received");

        cx.dispatch_on_registry(SyncEvent::Receive, &entity);
        if let Some(event) = SyncEvent::from_operation(message.operation()) {
            if event == SyncEvent::Delete {
                behavior.persist_delete(&cx, &entity, false)?;
            }
            cx.dispatch_on_registry(event, &entity);
            cx.dispatch_on_class(event, &entity);
        }
        Ok(entity)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Instances
    // ─────────────────────────────────────────────────────────────────────

    /// A fresh, never-synced instance of a registered type.
    pub fn create(&self, sync_type: &str) -> Result<EntityHandle> {
        self.class(sync_type)
            .map(|class| class.create())
            .ok_or_else(|| StoreError::UnregisteredType(sync_type.to_string()))
    }

    /// A detached copy of `entity`, never stored in an identity map.
    pub fn sync_clone(&self, entity: &EntityHandle) -> EntityHandle {
        EntityHandle::new(entity.read().clone_detached())
    }

    /// The stored instance of a persistent type.
    pub fn get(&self, sync_type: &str, key: &StorageKey) -> Option<EntityHandle> {
        self.class(sync_type)?.storage()?.get(key)
    }

    /// The stored instance of a persistent type, by primary-key values.
    pub fn find(&self, sync_type: &str, values: &[&Value]) -> Option<EntityHandle> {
        self.get(sync_type, &StorageKey::from_values(values))
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.inner.classes.read().keys().cloned().collect();
        f.debug_struct("Registry").field("classes", &names).finish()
    }
}
