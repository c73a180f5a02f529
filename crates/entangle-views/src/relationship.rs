//! Navigation between related types.
//!
//! A [`Relationship`] links a *local* type, whose attributes hold the key of
//! a *remote* instance, to that remote type. Keys are given as local
//! attribute names in the order of the remote type's primary keys.
//!
//! Local navigation looks the remote key up in the remote identity map. When
//! the remote instance has not arrived yet and a placeholder constructor is
//! configured, the caller gets the placeholder plus an [`Arrival`] that
//! resolves once the remote instance syncs. Remote navigation is backed by a
//! [`MapFilter`] over the local type keyed by remote key.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use entangle_core::{EntityHandle, StorageKey};
use entangle_store::SyncClass;
use futures::channel::oneshot;
use futures::future::Shared;
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, ViewError};
use crate::filter::{FilterOptions, Subscriptions};
use crate::list::Order;
use crate::map::{MapFilter, MapNode, NodeKind};

/// How many local instances may point at one remote instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cardinality {
    #[default]
    OneToMany,
    OneToOne,
}

impl Cardinality {
    fn node_kind(self) -> NodeKind {
        match self {
            Cardinality::OneToMany => NodeKind::List,
            Cardinality::OneToOne => NodeKind::Slot,
        }
    }
}

/// Builds a stand-in for a remote instance that has not arrived. Receives
/// the remote key and the local instance.
pub type Placeholder = Arc<dyn Fn(&StorageKey, &EntityHandle) -> EntityHandle + Send + Sync>;

#[derive(Clone, Default)]
pub struct RelationshipOptions {
    pub cardinality: Cardinality,
    /// Also follow `transition` messages of the local type.
    pub include_transitions: bool,
    /// Order of the local instances returned by remote navigation.
    pub order: Option<Order>,
    pub placeholder: Option<Placeholder>,
}

impl RelationshipOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn one_to_one(mut self) -> Self {
        self.cardinality = Cardinality::OneToOne;
        self
    }

    pub fn with_transitions(mut self) -> Self {
        self.include_transitions = true;
        self
    }

    pub fn with_order<F>(mut self, order: F) -> Self
    where
        F: Fn(&EntityHandle, &EntityHandle) -> std::cmp::Ordering + Send + Sync + 'static,
    {
        self.order = Some(Arc::new(order));
        self
    }

    pub fn with_placeholder<F>(mut self, placeholder: F) -> Self
    where
        F: Fn(&StorageKey, &EntityHandle) -> EntityHandle + Send + Sync + 'static,
    {
        self.placeholder = Some(Arc::new(placeholder));
        self
    }
}

impl fmt::Debug for RelationshipOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationshipOptions")
            .field("cardinality", &self.cardinality)
            .field("include_transitions", &self.include_transitions)
            .field("ordered", &self.order.is_some())
            .field("placeholder", &self.placeholder.is_some())
            .finish()
    }
}

/// Result of local navigation.
#[derive(Debug)]
pub enum Remote {
    Loaded(EntityHandle),
    /// Not in the identity map yet.
    Missing {
        placeholder: EntityHandle,
        arrival: Arrival,
    },
}

impl Remote {
    pub fn loaded(&self) -> Option<&EntityHandle> {
        match self {
            Remote::Loaded(entity) => Some(entity),
            Remote::Missing { .. } => None,
        }
    }
}

/// Resolves to the remote instance once it arrives, or to `None` if the
/// relationship is closed first.
#[derive(Clone)]
pub struct Arrival {
    key: StorageKey,
    inner: Shared<oneshot::Receiver<EntityHandle>>,
}

impl Arrival {
    pub fn key(&self) -> &StorageKey {
        &self.key
    }
}

impl Future for Arrival {
    type Output = Option<EntityHandle>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx).map(|received| received.ok())
    }
}

impl fmt::Debug for Arrival {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arrival").field("key", &self.key).finish()
    }
}

struct Pending {
    sender: oneshot::Sender<EntityHandle>,
    arrival: Shared<oneshot::Receiver<EntityHandle>>,
}

type PendingArrivals = Arc<Mutex<HashMap<StorageKey, Pending>>>;

/// A navigable link from a local type to a remote type.
pub struct Relationship {
    local: SyncClass,
    remote: SyncClass,
    keys: Arc<[String]>,
    cardinality: Cardinality,
    placeholder: Option<Placeholder>,
    locals: MapFilter<StorageKey>,
    pending: PendingArrivals,
    arrivals: Subscriptions,
}

impl Relationship {
    /// Link `local` to `remote`. `keys` names the local attributes holding
    /// the remote primary keys, in the remote's key order.
    ///
    /// The remote type must be persistent. Existing local instances are
    /// indexed immediately.
    pub fn new<I, S>(
        local: &SyncClass,
        remote: &SyncClass,
        keys: I,
        options: RelationshipOptions,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Arc<[String]> = keys.into_iter().map(Into::into).collect();
        if remote.storage().is_none() {
            return Err(ViewError::NotPersistent(remote.name().to_string()));
        }
        if keys.is_empty() || keys.len() != remote.schema().primary_keys().len() {
            return Err(ViewError::KeyMismatch {
                remote: remote.name().to_string(),
                keys: keys.to_vec(),
            });
        }

        let filter_options = FilterOptions {
            include_transitions: options.include_transitions,
            collection: local.storage().map(|s| s.values()).unwrap_or_default(),
            order: options.order.clone(),
        };
        let add_events = filter_options.add_events();
        let key_names = Arc::clone(&keys);
        let locals = MapFilter::new(
            local,
            filter_options,
            options.cardinality.node_kind(),
            move |entity| remote_key(&key_names, entity),
        );

        let pending: PendingArrivals = Arc::default();
        let mut arrivals = Subscriptions::new(remote.events());
        if options.placeholder.is_some() {
            for event in add_events {
                let pending = Arc::clone(&pending);
                arrivals.push(remote.events().subscribe(event, move |cx| {
                    let key = cx.entity.read().storage_key();
                    let waiting = key.and_then(|key| pending.lock().remove(&key));
                    if let Some(waiting) = waiting {
                        debug!(entity = %cx.entity.id(), "remote arrived");
                        // The receiver is gone only if every Arrival was dropped.
                        let _ = waiting.sender.send(cx.entity.clone());
                    }
                    Ok(())
                }));
            }
        }

        debug!(local = local.name(), remote = remote.name(), keys = ?keys, "relationship attached");
        Ok(Self {
            local: local.clone(),
            remote: remote.clone(),
            keys,
            cardinality: options.cardinality,
            placeholder: options.placeholder,
            locals,
            pending,
            arrivals,
        })
    }

    pub fn local(&self) -> &SyncClass {
        &self.local
    }

    pub fn remote(&self) -> &SyncClass {
        &self.remote
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// The remote key `local` points at, if all its key attributes are set.
    pub fn remote_key(&self, local: &EntityHandle) -> Option<StorageKey> {
        remote_key(&self.keys, local)
    }

    /// Navigate from a local instance to its remote instance.
    ///
    /// Returns `None` when the local key is incomplete, or when the remote
    /// instance is unknown and no placeholder is configured.
    pub fn remote_of(&self, local: &EntityHandle) -> Option<Remote> {
        let key = self.remote_key(local)?;
        let storage = self.remote.storage()?;
        if let Some(found) = storage.get(&key) {
            return Some(Remote::Loaded(found));
        }
        let placeholder = self.placeholder.as_ref()?;

        let arrival = {
            let mut pending = self.pending.lock();
            // Checked again under the lock so an arrival cannot slip between
            // the lookup and the registration.
            if let Some(found) = storage.get(&key) {
                return Some(Remote::Loaded(found));
            }
            pending
                .entry(key.clone())
                .or_insert_with(|| {
                    let (sender, receiver) = oneshot::channel();
                    Pending {
                        sender,
                        arrival: receiver.shared(),
                    }
                })
                .arrival
                .clone()
        };

        Some(Remote::Missing {
            placeholder: placeholder(&key, local),
            arrival: Arrival {
                key,
                inner: arrival,
            },
        })
    }

    /// Point `local` at `remote` by copying the remote primary keys into the
    /// local key attributes.
    ///
    /// The change is local; the remote navigation index follows once the
    /// local instance syncs.
    pub fn set_remote(&self, local: &EntityHandle, remote: &EntityHandle) -> Result<()> {
        check_type(&self.local, local)?;
        check_type(&self.remote, remote)?;

        let values: Vec<Value> = {
            let remote = remote.read();
            self.remote
                .schema()
                .primary_keys()
                .iter()
                .map(|key| remote.get(key).filter(|v| !v.is_null()).cloned())
                .collect::<Option<_>>()
                .ok_or_else(|| ViewError::MissingRemoteKey(self.remote.name().to_string()))?
        };

        let mut local = local.write();
        for (key, value) in self.keys.iter().zip(values) {
            local.set(key.clone(), value);
        }
        Ok(())
    }

    /// Local instances pointing at `remote` (one-to-many).
    pub fn locals_of(&self, remote: &EntityHandle) -> Vec<EntityHandle> {
        self.node_of(remote)
            .map(|node| node.items())
            .unwrap_or_default()
    }

    /// The local instance pointing at `remote` (one-to-one).
    pub fn local_of(&self, remote: &EntityHandle) -> Option<EntityHandle> {
        self.node_of(remote)?.get()
    }

    /// The live node of local instances pointing at `remote`.
    pub fn node_of(&self, remote: &EntityHandle) -> Option<MapNode> {
        let key = remote.read().storage_key()?;
        Some(self.locals.get(&key))
    }

    /// Detach from both types. Outstanding arrivals resolve to `None`.
    pub fn close(&mut self) {
        self.locals.close();
        self.arrivals.cancel();
        self.pending.lock().clear();
    }
}

impl fmt::Debug for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relationship")
            .field("local", &self.local.name())
            .field("remote", &self.remote.name())
            .field("keys", &self.keys)
            .field("cardinality", &self.cardinality)
            .finish()
    }
}

fn remote_key(keys: &[String], local: &EntityHandle) -> Option<StorageKey> {
    let local = local.read();
    StorageKey::lookup(keys, |key| local.get(key))
}

fn check_type(class: &SyncClass, entity: &EntityHandle) -> Result<()> {
    let actual = entity.sync_type();
    if actual != class.name() {
        return Err(ViewError::TypeMismatch {
            expected: class.name().to_string(),
            actual,
        });
    }
    Ok(())
}
