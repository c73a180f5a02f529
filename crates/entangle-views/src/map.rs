//! Keyed filters.
//!
//! A [`MapFilter`] uses the category as a key and keeps one [`MapNode`] per
//! key. Nodes are shared handles: a node read before any member arrives is
//! the same node the members are later added to.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use entangle_core::EntityHandle;
use entangle_store::SyncClass;
use parking_lot::Mutex;

use crate::filter::{Filter, FilterOptions};
use crate::list::{Members, Order};

/// Shape of the nodes of a [`MapFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeKind {
    /// Every member with the key.
    #[default]
    List,
    /// The most recently added member with the key.
    Slot,
}

/// The members sharing one key.
#[derive(Clone)]
pub struct MapNode {
    kind: NodeKind,
    members: Arc<Mutex<Members>>,
    order: Option<Order>,
}

impl MapNode {
    fn empty(kind: NodeKind, order: Option<Order>) -> Self {
        Self {
            kind,
            members: Arc::default(),
            order,
        }
    }

    fn add(&self, entity: &EntityHandle) {
        let mut members = self.members.lock();
        match self.kind {
            NodeKind::List => {
                members.insert(entity);
            }
            NodeKind::Slot => members.replace(entity),
        }
    }

    fn remove(&self, entity: &EntityHandle) {
        self.members.lock().remove(entity);
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Members, sorted when the filter has an order.
    pub fn items(&self) -> Vec<EntityHandle> {
        self.members.lock().sorted(self.order.as_ref())
    }

    /// The slot's value; for a list node, its first member.
    pub fn get(&self) -> Option<EntityHandle> {
        let mut members = self.members.lock();
        members.sorted(self.order.as_ref());
        members.first()
    }

    pub fn contains(&self, entity: &EntityHandle) -> bool {
        self.members.lock().contains(entity)
    }

    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ptr_eq(&self, other: &MapNode) -> bool {
        Arc::ptr_eq(&self.members, &other.members)
    }
}

impl fmt::Debug for MapNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapNode")
            .field("kind", &self.kind)
            .field("len", &self.len())
            .finish()
    }
}

struct Nodes<K> {
    kind: NodeKind,
    order: Option<Order>,
    map: Mutex<HashMap<K, MapNode>>,
}

impl<K: Eq + Hash + Clone> Nodes<K> {
    fn node(&self, key: &K) -> MapNode {
        self.map
            .lock()
            .entry(key.clone())
            .or_insert_with(|| MapNode::empty(self.kind, self.order.clone()))
            .clone()
    }
}

/// Instances of a type grouped by a key.
pub struct MapFilter<K> {
    filter: Filter<K>,
    nodes: Arc<Nodes<K>>,
}

impl<K> MapFilter<K>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
{
    /// `key` returns `None` for instances that belong to no node.
    pub fn new<F>(target: &SyncClass, options: FilterOptions, kind: NodeKind, key: F) -> Self
    where
        F: Fn(&EntityHandle) -> Option<K> + Send + Sync + 'static,
    {
        let nodes = Arc::new(Nodes {
            kind,
            order: options.order.clone(),
            map: Mutex::new(HashMap::new()),
        });
        let (adding, removing) = (Arc::clone(&nodes), Arc::clone(&nodes));
        let filter = Filter::new(
            target,
            options,
            key,
            move |entity, key| adding.node(key).add(entity),
            move |entity, key| {
                let node = removing.map.lock().get(key).cloned();
                if let Some(node) = node {
                    node.remove(entity);
                }
            },
        );
        Self { filter, nodes }
    }

    /// The node for `key`. An unknown key gets an empty node, which later
    /// members with that key are added to.
    pub fn get(&self, key: &K) -> MapNode {
        self.nodes.node(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.nodes.map.lock().contains_key(key)
    }

    pub fn keys(&self) -> Vec<K> {
        self.nodes.map.lock().keys().cloned().collect()
    }
}

impl<K> MapFilter<K> {
    pub fn kind(&self) -> NodeKind {
        self.nodes.kind
    }

    pub fn close(&mut self) {
        self.filter.close();
    }

    pub fn filter(&self) -> &Filter<K> {
        &self.filter
    }
}

impl<K> fmt::Debug for MapFilter<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapFilter")
            .field("kind", &self.nodes.kind)
            .field("filter", &self.filter)
            .field("nodes", &self.nodes.map.lock().len())
            .finish()
    }
}
