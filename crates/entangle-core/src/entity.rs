//! Synchronized entities.
//!
//! An [`Entity`] is a typed bag of attribute values plus the bookkeeping the
//! engine needs to reconcile it with the server:
//!
//! - the [`Snapshot`] of attribute values as of the last merge, used to find
//!   local modifications and to roll back failed transitions;
//! - the owner key (`_sync_owner`), if the entity belongs to an owner;
//! - the in-flight [`TransitionState`], if an optimistic update is outstanding.
//!
//! Entities are shared through [`EntityHandle`]. The registry, derived views
//! and the application all hold handles to the same instance; identity is
//! pointer identity.
//!
//! ## Merging
//!
//! Merging is split in two steps so that callers can raise the broken
//! transition event between them without holding the entity lock:
//!
//! ```ignore
//! let broken = handle.write().break_transition(&msg);
//! if let Some(stale) = broken {
//!     // notify listeners
//! }
//! handle.write().apply(&msg);
//! ```
//!
//! [`Entity::merge`] runs both steps back to back.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use futures::channel::oneshot;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde_json::{Map, Value};

use crate::error::{CoreError, Result};
use crate::message::{fields, Operation, WireMessage, RESERVED_PREFIX};
use crate::reply::TransitionPromise;
use crate::schema::Schema;
use crate::types::{EntityId, StorageKey, TransitionId};

// ─────────────────────────────────────────────────────────────────────────────
// Snapshot
// ─────────────────────────────────────────────────────────────────────────────

/// Attribute values as of the last merge.
///
/// Never mutated in place; each merge installs a new one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot(Arc<Map<String, Value>>);

impl Snapshot {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether two snapshots are the same installed instance.
    pub fn ptr_eq(&self, other: &Snapshot) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transition state
// ─────────────────────────────────────────────────────────────────────────────

/// An outstanding optimistic transition.
pub struct TransitionState {
    id: TransitionId,
    /// Snapshot values of every attribute sent under this transition.
    /// `None` means the attribute was absent from the snapshot.
    pre_transition: BTreeMap<String, Option<Value>>,
    promise: Option<TransitionPromise>,
    /// Fired when a mismatched merge breaks the transition.
    breaker: Option<oneshot::Sender<()>>,
}

impl TransitionState {
    pub fn id(&self) -> &TransitionId {
        &self.id
    }

    pub fn pre_transition(&self) -> &BTreeMap<String, Option<Value>> {
        &self.pre_transition
    }

    pub fn promise(&self) -> Option<&TransitionPromise> {
        self.promise.as_ref()
    }
}

impl fmt::Debug for TransitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionState")
            .field("id", &self.id)
            .field("pre_transition", &self.pre_transition)
            .field("pending", &self.promise.is_some())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Entity
// ─────────────────────────────────────────────────────────────────────────────

/// A synchronized object.
#[derive(Debug)]
pub struct Entity {
    id: EntityId,
    schema: Arc<Schema>,
    attributes: Map<String, Value>,
    owner: Option<Value>,
    snapshot: Option<Snapshot>,
    transition: Option<TransitionState>,
}

impl Entity {
    /// Create a fresh, never-synced entity.
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            id: EntityId::next(),
            schema,
            attributes: Map::new(),
            owner: None,
            snapshot: None,
            transition: None,
        }
    }

    /// Create a never-synced entity with initial attribute values.
    pub fn with_attributes<I, K>(schema: Arc<Schema>, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut entity = Self::new(schema);
        for (name, value) in attributes {
            entity.set(name, value);
        }
        entity
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The type tag.
    pub fn sync_type(&self) -> &str {
        self.schema.name()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Attributes
    // ─────────────────────────────────────────────────────────────────────

    /// Read an attribute. `_sync_owner` reads the owner key.
    pub fn get(&self, name: &str) -> Option<&Value> {
        if name == fields::OWNER {
            self.owner.as_ref()
        } else {
            self.attributes.get(name)
        }
    }

    /// Write an attribute locally. Does not touch the snapshot.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if name == fields::OWNER {
            self.owner = Some(value).filter(|v| !v.is_null());
        } else {
            self.attributes.insert(name, value);
        }
    }

    /// Remove an attribute locally.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        if name == fields::OWNER {
            self.owner.take()
        } else {
            self.attributes.remove(name)
        }
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Key of the owning entity, if any.
    pub fn owner(&self) -> Option<&Value> {
        self.owner.as_ref()
    }

    pub fn set_owner(&mut self, owner: Option<Value>) {
        self.owner = owner.filter(|v| !v.is_null());
    }

    // ─────────────────────────────────────────────────────────────────────
    // Identity
    // ─────────────────────────────────────────────────────────────────────

    /// Identity-map key, or `None` if the type has no primary keys or a key
    /// attribute is unset.
    pub fn storage_key(&self) -> Option<StorageKey> {
        self.schema.storage_key(|name| self.get(name))
    }

    /// Identity-map key, failing with the first missing primary key.
    pub fn require_storage_key(&self) -> Result<StorageKey> {
        if let Some(missing) = self
            .schema
            .primary_keys()
            .iter()
            .find(|key| self.get(key).map_or(true, Value::is_null))
        {
            return Err(CoreError::MissingPrimaryKey {
                sync_type: self.sync_type().to_string(),
                key: missing.clone(),
            });
        }
        self.storage_key().ok_or_else(|| {
            CoreError::InvalidSchema(format!("{} declares no primary keys", self.sync_type()))
        })
    }

    /// Key value as other entities reference it in `_sync_owner`.
    ///
    /// A single primary key yields its value; a compound key yields the
    /// array of values in declaration order.
    pub fn key_value(&self) -> Option<Value> {
        let keys = self.schema.primary_keys();
        match keys {
            [] => None,
            [single] => self.get(single).cloned(),
            many => many
                .iter()
                .map(|key| self.get(key).cloned())
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Snapshot & modification tracking
    // ─────────────────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    /// Whether the entity has been merged at least once.
    pub fn is_synced(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Declared attributes whose value differs from the snapshot.
    ///
    /// A never-synced entity reports every declared attribute it has a value
    /// for. The result follows declaration order.
    pub fn sync_modified(&self) -> Vec<String> {
        self.schema
            .attributes()
            .iter()
            .filter(|name| match &self.snapshot {
                None => self.get(name).is_some(),
                Some(snapshot) => self.get(name) != snapshot.get(name),
            })
            .cloned()
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Merge
    // ─────────────────────────────────────────────────────────────────────

    /// Merge an inbound message: roll back a mismatched transition, then apply.
    ///
    /// Returns the id of the transition that was broken, if any.
    pub fn merge(&mut self, msg: &WireMessage) -> Option<TransitionId> {
        let broken = self.break_transition(msg);
        self.apply(msg);
        broken
    }

    /// Roll back the in-flight transition if `msg` carries a different id.
    ///
    /// Attributes recorded when the transition began are restored to their
    /// snapshot values and the transition is cleared, so a later message
    /// cannot break it twice. The break signal handed out by
    /// [`Entity::break_signal`] fires. Returns the stale id.
    pub fn break_transition(&mut self, msg: &WireMessage) -> Option<TransitionId> {
        let current = self.transition.as_ref()?;
        if msg.transition_id().as_ref() == Some(&current.id) {
            return None;
        }
        let state = self.transition.take()?;
        if let Some(breaker) = state.breaker {
            let _ = breaker.send(());
        }
        for (name, value) in state.pre_transition {
            match value {
                Some(value) => self.set(name, value),
                None => {
                    self.remove(&name);
                }
            }
        }
        Some(state.id)
    }

    /// Apply a message's attribute values and install a new snapshot.
    ///
    /// Reserved keys are skipped except `_sync_owner`. `transition_id` is
    /// protocol metadata and never stored.
    pub fn apply(&mut self, msg: &WireMessage) {
        let mut next = self
            .snapshot
            .as_ref()
            .map(|s| s.as_map().clone())
            .unwrap_or_default();

        for (name, value) in msg.iter() {
            if name == fields::OWNER {
                self.set_owner(Some(value.clone()));
            } else if name == fields::TRANSITION_ID || name.starts_with(RESERVED_PREFIX) {
                continue;
            } else {
                self.attributes.insert(name.clone(), value.clone());
            }
            next.insert(name.clone(), value.clone());
        }

        self.snapshot = Some(Snapshot(Arc::new(next)));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Serialization
    // ─────────────────────────────────────────────────────────────────────

    /// Serialize for the wire.
    ///
    /// Includes the owner (if any), the type tag, the transition id (if any)
    /// and each selected attribute the entity has a value for. `None` selects
    /// every declared attribute.
    pub fn to_sync(&self, attributes: Option<&[String]>) -> WireMessage {
        let mut msg = WireMessage::new(self.sync_type());
        if let Some(owner) = &self.owner {
            msg.insert(fields::OWNER, owner.clone());
        }
        if let Some(transition) = &self.transition {
            msg.insert(
                fields::TRANSITION_ID,
                Value::String(transition.id.as_str().to_string()),
            );
        }
        let selected = attributes.unwrap_or_else(|| self.schema.attributes());
        for name in selected {
            if let Some(value) = self.get(name) {
                msg.insert(name.clone(), value.clone());
            }
        }
        msg
    }

    /// A detached copy with a fresh identity, seeded from this entity's
    /// serialized form.
    pub fn clone_detached(&self) -> Entity {
        let mut copy = Entity::new(Arc::clone(&self.schema));
        let seed = self.to_sync(None).with_operation(Operation::Clone);
        copy.apply(&seed);
        copy
    }

    // ─────────────────────────────────────────────────────────────────────
    // Transition bookkeeping
    // ─────────────────────────────────────────────────────────────────────

    pub fn transition(&self) -> Option<&TransitionState> {
        self.transition.as_ref()
    }

    pub fn transition_id(&self) -> Option<&TransitionId> {
        self.transition.as_ref().map(|t| &t.id)
    }

    /// The shared result of the outstanding transition, if any.
    pub fn pending_transition(&self) -> Option<TransitionPromise> {
        self.transition.as_ref().and_then(|t| t.promise.clone())
    }

    /// Mark a transition as started. Replaces any previous one.
    pub fn begin_transition(&mut self, id: TransitionId) {
        self.transition = Some(TransitionState {
            id,
            pre_transition: BTreeMap::new(),
            promise: None,
            breaker: None,
        });
    }

    /// Receiver completed when the current transition is broken.
    ///
    /// It is cancelled instead if the transition settles or is replaced.
    /// Each call replaces the previous signal.
    pub fn break_signal(&mut self) -> Option<oneshot::Receiver<()>> {
        let transition = self.transition.as_mut()?;
        let (tx, rx) = oneshot::channel();
        transition.breaker = Some(tx);
        Some(rx)
    }

    /// Attach the shared result to the current transition.
    pub fn set_transition_promise(&mut self, promise: TransitionPromise) {
        if let Some(transition) = &mut self.transition {
            transition.promise = Some(promise);
        }
    }

    /// Record snapshot values for attributes sent under the current
    /// transition. Values recorded earlier are kept.
    ///
    /// Nothing is recorded for a never-synced entity.
    pub fn record_pre_transition(&mut self, attributes: &[String]) {
        let (Some(transition), Some(snapshot)) = (&mut self.transition, &self.snapshot) else {
            return;
        };
        for name in attributes {
            transition
                .pre_transition
                .entry(name.clone())
                .or_insert_with(|| snapshot.get(name).cloned());
        }
    }

    /// Clear the transition if it is still the one identified by `id`.
    ///
    /// Returns whether anything was cleared.
    pub fn settle_transition(&mut self, id: &TransitionId) -> bool {
        match &self.transition {
            Some(current) if &current.id == id => {
                self.transition = None;
                true
            }
            _ => false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EntityHandle
// ─────────────────────────────────────────────────────────────────────────────

/// Shared handle to an [`Entity`].
///
/// Cloning the handle shares the instance. Equality is identity.
#[derive(Clone)]
pub struct EntityHandle {
    id: EntityId,
    inner: Arc<RwLock<Entity>>,
}

impl EntityHandle {
    pub fn new(entity: Entity) -> Self {
        Self {
            id: entity.id,
            inner: Arc::new(RwLock::new(entity)),
        }
    }

    /// Identity of the underlying instance. Readable without locking.
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Entity> {
        self.inner.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Entity> {
        self.inner.write()
    }

    pub fn ptr_eq(&self, other: &EntityHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn schema(&self) -> Arc<Schema> {
        Arc::clone(self.read().schema())
    }

    pub fn sync_type(&self) -> String {
        self.read().sync_type().to_string()
    }

    /// Read one attribute value.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.read().get(name).cloned()
    }

    /// Write one attribute value locally.
    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.write().set(name, value);
    }
}

impl From<Entity> for EntityHandle {
    fn from(entity: Entity) -> Self {
        Self::new(entity)
    }
}

impl PartialEq for EntityHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for EntityHandle {}

impl fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_read() {
            Some(entity) => f
                .debug_struct("EntityHandle")
                .field("id", &self.id)
                .field("sync_type", &entity.sync_type())
                .field("attributes", entity.attributes())
                .finish(),
            None => f
                .debug_struct("EntityHandle")
                .field("id", &self.id)
                .finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn widget_schema() -> Arc<Schema> {
        Arc::new(Schema::new("Widget", ["id"], ["id", "color", "size"]).unwrap())
    }

    fn msg(value: Value) -> WireMessage {
        match value {
            Value::Object(map) => WireMessage::from_map(map),
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_apply_sets_attributes_and_snapshot() {
        let mut entity = Entity::new(widget_schema());
        entity.apply(&msg(json!({
            "_sync_type": "Widget",
            "_sync_operation": "sync",
            "_sync_owner": "o1",
            "id": 1,
            "color": "red",
        })));

        assert_eq!(entity.get("color"), Some(&json!("red")));
        assert_eq!(entity.owner(), Some(&json!("o1")));
        assert!(entity.get("_sync_type").is_none());
        let snapshot = entity.snapshot().unwrap();
        assert_eq!(snapshot.get("color"), Some(&json!("red")));
        assert_eq!(snapshot.get("_sync_owner"), Some(&json!("o1")));
        assert!(!snapshot.contains("_sync_type"));
    }

    #[test]
    fn test_apply_never_stores_transition_id() {
        let mut entity = Entity::new(widget_schema());
        entity.apply(&msg(json!({"id": 1, "transition_id": "abc"})));
        assert!(entity.attributes().get("transition_id").is_none());
        assert!(!entity.snapshot().unwrap().contains("transition_id"));
    }

    #[test]
    fn test_snapshot_is_union_and_replaced() {
        let mut entity = Entity::new(widget_schema());
        entity.apply(&msg(json!({"id": 1, "color": "red"})));
        let first = entity.snapshot().cloned().unwrap();
        entity.apply(&msg(json!({"size": 3})));
        let second = entity.snapshot().unwrap();

        assert!(!first.ptr_eq(second));
        assert!(!first.contains("size"));
        assert_eq!(second.get("color"), Some(&json!("red")));
        assert_eq!(second.get("size"), Some(&json!(3)));
    }

    #[test]
    fn test_merge_replay_is_idempotent() {
        let m = msg(json!({"id": 1, "color": "blue", "size": 2}));
        let mut entity = Entity::new(widget_schema());
        entity.merge(&m);
        let attrs = entity.attributes().clone();
        let snapshot = entity.snapshot().unwrap().as_map().clone();
        entity.merge(&m);
        assert_eq!(entity.attributes(), &attrs);
        assert_eq!(entity.snapshot().unwrap().as_map(), &snapshot);
    }

    #[test]
    fn test_sync_modified() {
        let mut entity = Entity::with_attributes(widget_schema(), [("id", json!(1))]);
        entity.set("color", json!("red"));
        assert_eq!(entity.sync_modified(), vec!["id", "color"]);

        let echoed = entity.to_sync(None);
        entity.apply(&echoed);
        assert!(entity.sync_modified().is_empty());

        entity.set("size", json!(9));
        assert_eq!(entity.sync_modified(), vec!["size"]);
    }

    #[test]
    fn test_to_sync_selected_and_default() {
        let mut entity = Entity::with_attributes(
            widget_schema(),
            [("id", json!(7)), ("color", json!("green"))],
        );
        entity.set_owner(Some(json!("owner")));

        let all = entity.to_sync(None);
        assert_eq!(all.sync_type(), Some("Widget"));
        assert_eq!(all.get("_sync_owner"), Some(&json!("owner")));
        assert_eq!(all.get("color"), Some(&json!("green")));
        assert!(!all.contains("size"));
        assert!(!all.contains("transition_id"));

        let only_id = entity.to_sync(Some(&["id".to_string()]));
        assert!(!only_id.contains("color"));
        assert_eq!(only_id.get("id"), Some(&json!(7)));
    }

    #[test]
    fn test_to_sync_includes_transition_id() {
        let mut entity = Entity::with_attributes(widget_schema(), [("id", json!(7))]);
        let id = TransitionId::from_wire("t-1");
        entity.begin_transition(id);
        assert_eq!(entity.to_sync(None).get("transition_id"), Some(&json!("t-1")));
    }

    #[test]
    fn test_break_transition_restores_and_clears() {
        let mut entity = Entity::new(widget_schema());
        entity.apply(&msg(json!({"id": 1, "color": "red"})));

        entity.set("color", json!("blue"));
        entity.set("size", json!(4));
        entity.begin_transition(TransitionId::from_wire("mine"));
        entity.record_pre_transition(&["color".to_string(), "size".to_string()]);

        let broken = entity.merge(&msg(json!({"id": 1, "transition_id": "theirs"})));
        assert_eq!(broken, Some(TransitionId::from_wire("mine")));
        assert_eq!(entity.get("color"), Some(&json!("red")));
        assert!(entity.get("size").is_none());
        assert!(entity.transition().is_none());

        // Already cleared; a second conflicting message breaks nothing.
        assert!(entity.merge(&msg(json!({"id": 1}))).is_none());
    }

    #[test]
    fn test_break_signal_fires_on_break() {
        let mut entity = Entity::new(widget_schema());
        entity.apply(&msg(json!({"id": 1, "color": "red"})));
        entity.begin_transition(TransitionId::from_wire("mine"));
        let mut signal = entity.break_signal().unwrap();

        entity.merge(&msg(json!({"id": 1, "transition_id": "theirs"})));
        assert_eq!(signal.try_recv(), Ok(Some(())));
    }

    #[test]
    fn test_break_signal_cancelled_on_settle() {
        let mut entity = Entity::new(widget_schema());
        assert!(entity.break_signal().is_none());

        entity.begin_transition(TransitionId::from_wire("mine"));
        let mut signal = entity.break_signal().unwrap();
        assert!(entity.settle_transition(&TransitionId::from_wire("mine")));
        assert!(signal.try_recv().is_err());
    }

    #[test]
    fn test_matching_transition_is_kept() {
        let mut entity = Entity::new(widget_schema());
        entity.apply(&msg(json!({"id": 1, "color": "red"})));
        entity.begin_transition(TransitionId::from_wire("mine"));
        entity.set("color", json!("blue"));
        entity.record_pre_transition(&["color".to_string()]);

        assert!(entity
            .merge(&msg(json!({"id": 1, "color": "blue", "transition_id": "mine"})))
            .is_none());
        assert_eq!(entity.transition_id(), Some(&TransitionId::from_wire("mine")));
    }

    #[test]
    fn test_record_pre_transition_is_additive() {
        let mut entity = Entity::new(widget_schema());
        entity.apply(&msg(json!({"id": 1, "color": "red"})));
        entity.begin_transition(TransitionId::from_wire("t"));
        entity.record_pre_transition(&["color".to_string()]);
        entity.apply(&msg(json!({"color": "green", "transition_id": "t"})));
        entity.record_pre_transition(&["color".to_string(), "size".to_string()]);

        let record = entity.transition().unwrap().pre_transition();
        assert_eq!(record.get("color"), Some(&Some(json!("red"))));
        assert_eq!(record.get("size"), Some(&None));
    }

    #[test]
    fn test_settle_only_matching() {
        let mut entity = Entity::new(widget_schema());
        entity.begin_transition(TransitionId::from_wire("a"));
        assert!(!entity.settle_transition(&TransitionId::from_wire("b")));
        assert!(entity.settle_transition(&TransitionId::from_wire("a")));
        assert!(entity.transition().is_none());
    }

    #[test]
    fn test_key_value() {
        let compound = Arc::new(Schema::new("Pair", ["a", "b"], ["a", "b"]).unwrap());
        let entity = Entity::with_attributes(compound, [("a", json!(1)), ("b", json!("x"))]);
        assert_eq!(entity.key_value(), Some(json!([1, "x"])));

        let single = Entity::with_attributes(widget_schema(), [("id", json!(5))]);
        assert_eq!(single.key_value(), Some(json!(5)));
    }

    #[test]
    fn test_storage_key_reads_owner() {
        let schema = Arc::new(
            Schema::new("IHave", ["serial", "epoch", "_sync_owner"], ["serial", "epoch"]).unwrap(),
        );
        let mut entity = Entity::with_attributes(schema, [("serial", json!(1)), ("epoch", json!(2))]);
        assert!(matches!(
            entity.require_storage_key(),
            Err(CoreError::MissingPrimaryKey { .. })
        ));
        entity.set_owner(Some(json!("o")));
        assert!(entity.require_storage_key().is_ok());
    }

    #[test]
    fn test_clone_detached() {
        let mut entity = Entity::with_attributes(widget_schema(), [("id", json!(1))]);
        entity.set("color", json!("red"));
        let copy = entity.clone_detached();
        assert_ne!(copy.id(), entity.id());
        assert_eq!(copy.get("color"), Some(&json!("red")));
        assert!(copy.is_synced());
    }

    #[test]
    fn test_handle_identity() {
        let a = EntityHandle::new(Entity::new(widget_schema()));
        let b = a.clone();
        let c = EntityHandle::new(Entity::new(widget_schema()));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.id(), b.id());
    }
}
