//! List-valued filters.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use entangle_core::EntityHandle;
use entangle_store::SyncClass;
use parking_lot::Mutex;

use crate::filter::{Filter, FilterOptions};

/// Ordering applied to list results.
pub type Order = Arc<dyn Fn(&EntityHandle, &EntityHandle) -> Ordering + Send + Sync>;

/// Members of a list, sorted on read when they changed since the last sort.
#[derive(Default)]
pub(crate) struct Members {
    items: Vec<EntityHandle>,
    dirty: bool,
}

impl Members {
    pub(crate) fn insert(&mut self, entity: &EntityHandle) -> bool {
        if self.contains(entity) {
            return false;
        }
        self.items.push(entity.clone());
        self.dirty = true;
        true
    }

    /// Make `entity` the only member.
    pub(crate) fn replace(&mut self, entity: &EntityHandle) {
        self.items.clear();
        self.items.push(entity.clone());
    }

    pub(crate) fn remove(&mut self, entity: &EntityHandle) -> bool {
        match self.items.iter().position(|item| item.ptr_eq(entity)) {
            Some(index) => {
                self.items.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn contains(&self, entity: &EntityHandle) -> bool {
        self.items.iter().any(|item| item.ptr_eq(entity))
    }

    pub(crate) fn sorted(&mut self, order: Option<&Order>) -> Vec<EntityHandle> {
        if let (true, Some(order)) = (self.dirty, order) {
            self.items.sort_by(|a, b| order(a, b));
            self.dirty = false;
        }
        self.items.clone()
    }

    pub(crate) fn first(&self) -> Option<EntityHandle> {
        self.items.first().cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }
}

/// The instances of a type matching a predicate, as a list.
///
/// With an order in the options, the list is sorted lazily: changes only
/// mark it dirty, and the next read sorts it.
pub struct ListFilter {
    filter: Filter<()>,
    members: Arc<Mutex<Members>>,
    order: Option<Order>,
}

impl ListFilter {
    pub fn new<P>(target: &SyncClass, options: FilterOptions, predicate: P) -> Self
    where
        P: Fn(&EntityHandle) -> bool + Send + Sync + 'static,
    {
        let members = Arc::new(Mutex::new(Members::default()));
        let order = options.order.clone();
        let (adding, removing) = (Arc::clone(&members), Arc::clone(&members));
        let filter = Filter::new(
            target,
            options,
            move |entity| predicate(entity).then_some(()),
            move |entity, _| {
                adding.lock().insert(entity);
            },
            move |entity, _| {
                removing.lock().remove(entity);
            },
        );
        Self {
            filter,
            members,
            order,
        }
    }

    /// Current members, in order when an order was given.
    pub fn items(&self) -> Vec<EntityHandle> {
        self.members.lock().sorted(self.order.as_ref())
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

    /// Whether the next read will sort.
    pub fn needs_sort(&self) -> bool {
        self.order.is_some() && self.members.lock().is_dirty()
    }

    pub fn close(&mut self) {
        self.filter.close();
    }

    pub fn filter(&self) -> &Filter<()> {
        &self.filter
    }
}

impl fmt::Debug for ListFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListFilter")
            .field("filter", &self.filter)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{phase, rank, registry};
    use serde_json::json;

    fn by_rank(a: &EntityHandle, b: &EntityHandle) -> Ordering {
        rank(a).cmp(&rank(b))
    }

    #[test]
    fn test_membership_follows_predicate() {
        let registry = registry();
        let class = registry.class("Phase").unwrap();
        let open = ListFilter::new(&class, FilterOptions::new(), |e| {
            e.get("state") == Some(json!("open"))
        });

        let a = phase(&registry, 1, "open");
        let b = phase(&registry, 2, "closed");
        assert!(open.contains(&a));
        assert!(!open.contains(&b));

        phase(&registry, 1, "closed");
        phase(&registry, 2, "open");
        assert!(!open.contains(&a));
        assert!(open.contains(&b));
        assert_eq!(open.len(), 1);
    }

    #[test]
    fn test_sorts_lazily() {
        let registry = registry();
        let class = registry.class("Phase").unwrap();
        let list = ListFilter::new(&class, FilterOptions::new().with_order(by_rank), |_| true);

        let a = crate::test_support::ranked(&registry, 1, 30);
        let b = crate::test_support::ranked(&registry, 2, 10);
        assert!(list.needs_sort());

        let items = list.items();
        assert!(!list.needs_sort());
        assert!(items[0].ptr_eq(&b));
        assert!(items[1].ptr_eq(&a));

        // Re-merging a member does not re-add it, so the order is kept.
        crate::test_support::ranked(&registry, 1, 30);
        assert!(!list.needs_sort());

        let c = crate::test_support::ranked(&registry, 3, 20);
        assert!(list.needs_sort());
        let items = list.items();
        assert!(items[1].ptr_eq(&c));
    }

    #[test]
    fn test_unordered_keeps_insertion_order() {
        let registry = registry();
        let class = registry.class("Phase").unwrap();
        let list = ListFilter::new(&class, FilterOptions::new(), |_| true);
        let a = phase(&registry, 5, "open");
        let b = phase(&registry, 4, "open");

        let items = list.items();
        assert!(items[0].ptr_eq(&a));
        assert!(items[1].ptr_eq(&b));
        assert!(!list.needs_sort());
    }
}
