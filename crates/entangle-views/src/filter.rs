//! Category filters over a type's lifecycle events.
//!
//! A [`Filter`] assigns every instance of its target type a category, or
//! none. It listens to the events that can change an instance's category
//! (`sync`, optionally `transition`) and to the ones that end an instance
//! (`delete`, `disappear`), and reports each membership change to its
//! `add`/`remove` callbacks exactly once: an instance whose category did not
//! change produces no callbacks, one that moved produces `remove(old)` then
//! `add(new)`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use entangle_core::{EntityHandle, EntityId};
use entangle_store::{EventBus, SubscriptionId, SyncClass, SyncEvent};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::list::Order;

/// Events that end an instance's membership.
pub const REMOVE_EVENTS: [SyncEvent; 2] = [SyncEvent::Delete, SyncEvent::Disappear];

/// How a filter attaches to its target.
#[derive(Clone, Default)]
pub struct FilterOptions {
    /// Also recompute categories on `transition` messages.
    pub include_transitions: bool,
    /// Instances to categorize before listening for events.
    pub collection: Vec<EntityHandle>,
    /// Order of list results, for views that keep lists.
    pub order: Option<Order>,
}

impl FilterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transitions(mut self) -> Self {
        self.include_transitions = true;
        self
    }

    pub fn with_collection<I>(mut self, collection: I) -> Self
    where
        I: IntoIterator<Item = EntityHandle>,
    {
        self.collection = collection.into_iter().collect();
        self
    }

    pub fn with_order<F>(mut self, order: F) -> Self
    where
        F: Fn(&EntityHandle, &EntityHandle) -> std::cmp::Ordering + Send + Sync + 'static,
    {
        self.order = Some(Arc::new(order));
        self
    }

    /// Events that recompute an instance's category.
    pub fn add_events(&self) -> Vec<SyncEvent> {
        let mut events = vec![SyncEvent::Sync];
        if self.include_transitions {
            events.push(SyncEvent::Transition);
        }
        events
    }
}

impl fmt::Debug for FilterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterOptions")
            .field("include_transitions", &self.include_transitions)
            .field("collection", &self.collection.len())
            .field("ordered", &self.order.is_some())
            .finish()
    }
}

/// Subscriptions on one bus, cancelled on drop.
pub(crate) struct Subscriptions {
    bus: EventBus,
    ids: Vec<SubscriptionId>,
}

impl Subscriptions {
    pub(crate) fn new(bus: &EventBus) -> Self {
        Self {
            bus: bus.clone(),
            ids: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, id: SubscriptionId) {
        self.ids.push(id);
    }

    pub(crate) fn cancel(&mut self) {
        for id in self.ids.drain(..) {
            self.bus.unsubscribe(id);
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl Drop for Subscriptions {
    fn drop(&mut self) {
        self.cancel();
    }
}

type Categorize<C> = Box<dyn Fn(&EntityHandle) -> Option<C> + Send + Sync>;
type Callback<C> = Box<dyn Fn(&EntityHandle, &C) + Send + Sync>;

struct FilterCore<C> {
    target: String,
    categorize: Categorize<C>,
    add: Callback<C>,
    remove: Callback<C>,
    categories: Mutex<HashMap<EntityId, C>>,
}

impl<C> FilterCore<C>
where
    C: Clone + PartialEq + fmt::Debug + Send + Sync + 'static,
{
    fn changed(&self, entity: &EntityHandle) {
        let new = (self.categorize)(entity);
        let old = {
            let mut categories = self.categories.lock();
            let old = categories.get(&entity.id()).cloned();
            if old == new {
                return;
            }
            match &new {
                Some(category) => categories.insert(entity.id(), category.clone()),
                None => categories.remove(&entity.id()),
            };
            old
        };
        trace!(target = %self.target, entity = %entity.id(), ?old, ?new, "category changed");
        if let Some(old) = &old {
            (self.remove)(entity, old);
        }
        if let Some(new) = &new {
            (self.add)(entity, new);
        }
    }

    fn gone(&self, entity: &EntityHandle) {
        let old = self.categories.lock().remove(&entity.id());
        if let Some(old) = old {
            trace!(target = %self.target, entity = %entity.id(), ?old, "member gone");
            (self.remove)(entity, &old);
        }
    }
}

/// An incrementally maintained categorization of one type's instances.
///
/// Dropping the filter detaches it from its target.
pub struct Filter<C> {
    core: Arc<FilterCore<C>>,
    target: Option<SyncClass>,
    subscriptions: Subscriptions,
}

impl<C> Filter<C>
where
    C: Clone + PartialEq + fmt::Debug + Send + Sync + 'static,
{
    /// Attach a filter to `target`.
    ///
    /// Instances of other types in `options.collection` are skipped.
    pub fn new<F, A, R>(
        target: &SyncClass,
        options: FilterOptions,
        categorize: F,
        add: A,
        remove: R,
    ) -> Self
    where
        F: Fn(&EntityHandle) -> Option<C> + Send + Sync + 'static,
        A: Fn(&EntityHandle, &C) + Send + Sync + 'static,
        R: Fn(&EntityHandle, &C) + Send + Sync + 'static,
    {
        let core = Arc::new(FilterCore {
            target: target.name().to_string(),
            categorize: Box::new(categorize),
            add: Box::new(add),
            remove: Box::new(remove),
            categories: Mutex::new(HashMap::new()),
        });

        for entity in &options.collection {
            if entity.sync_type() == target.name() {
                core.changed(entity);
            }
        }

        let events = target.events();
        let mut subscriptions = Subscriptions::new(events);
        for event in options.add_events() {
            let core = Arc::clone(&core);
            subscriptions.push(events.subscribe(event, move |cx| {
                core.changed(cx.entity);
                Ok(())
            }));
        }
        for event in REMOVE_EVENTS {
            let core = Arc::clone(&core);
            subscriptions.push(events.subscribe(event, move |cx| {
                core.gone(cx.entity);
                Ok(())
            }));
        }

        debug!(target = target.name(), members = core.categories.lock().len(), "filter attached");
        Self {
            core,
            target: Some(target.clone()),
            subscriptions,
        }
    }
}

impl<C> Filter<C> {
    /// The type this filter listens to, until closed.
    pub fn target(&self) -> Option<&SyncClass> {
        self.target.as_ref()
    }

    pub fn category_of(&self, entity: &EntityHandle) -> Option<C>
    where
        C: Clone,
    {
        self.core.categories.lock().get(&entity.id()).cloned()
    }

    /// Number of instances with a category.
    pub fn len(&self) -> usize {
        self.core.categories.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop listening and release the target. Idempotent.
    pub fn close(&mut self) {
        self.subscriptions.cancel();
        if let Some(target) = self.target.take() {
            debug!(target = target.name(), "filter closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

impl<C> fmt::Debug for Filter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("target", &self.core.target)
            .field("members", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{phase, registry};
    use entangle_core::{Operation, WireMessage};
    use serde_json::json;

    type Log = Arc<Mutex<Vec<String>>>;

    fn state_filter(class: &SyncClass, options: FilterOptions) -> (Filter<String>, Log) {
        let log: Log = Arc::default();
        let (adds, removes) = (Arc::clone(&log), Arc::clone(&log));
        let filter = Filter::new(
            class,
            options,
            |entity| entity.get("state").and_then(|s| s.as_str().map(str::to_string)),
            move |entity, category| {
                adds.lock().push(format!("add {} {category}", entity.get("id").unwrap_or_default()))
            },
            move |entity, category| {
                removes
                    .lock()
                    .push(format!("remove {} {category}", entity.get("id").unwrap_or_default()))
            },
        );
        (filter, log)
    }

    #[test]
    fn test_category_changes_are_minimal() {
        let registry = registry();
        let class = registry.class("Phase").unwrap();
        let (filter, log) = state_filter(&class, FilterOptions::new());

        let entity = phase(&registry, 1, "open");
        phase(&registry, 1, "open");
        phase(&registry, 1, "closed");
        assert_eq!(filter.category_of(&entity), Some("closed".to_string()));

        assert_eq!(
            log.lock().as_slice(),
            &["add 1 open", "remove 1 open", "add 1 closed"]
        );
    }

    #[test]
    fn test_no_category_means_excluded() {
        let registry = registry();
        let class = registry.class("Phase").unwrap();
        let (filter, log) = state_filter(&class, FilterOptions::new());

        let entity = phase(&registry, 1, "open");
        registry
            .sync_receive(
                &WireMessage::new("Phase").with("id", json!(1)).with("state", json!(null)),
                None,
            )
            .unwrap();

        assert_eq!(filter.category_of(&entity), None);
        assert!(filter.is_empty());
        assert_eq!(log.lock().as_slice(), &["add 1 open", "remove 1 open"]);
    }

    #[test]
    fn test_delete_removes_member() {
        let registry = registry();
        let class = registry.class("Phase").unwrap();
        let (filter, log) = state_filter(&class, FilterOptions::new());

        phase(&registry, 2, "open");
        let delete = WireMessage::new("Phase")
            .with_operation(Operation::Delete)
            .with("id", json!(2));
        registry.sync_receive(&delete, None).unwrap();

        assert!(filter.is_empty());
        assert_eq!(log.lock().as_slice(), &["add 2 open", "remove 2 open"]);
    }

    #[test]
    fn test_seeds_from_collection() {
        let registry = registry();
        let class = registry.class("Phase").unwrap();
        let existing = phase(&registry, 1, "open");
        let other = registry.create("Team").unwrap();

        let (filter, log) = state_filter(
            &class,
            FilterOptions::new().with_collection([existing.clone(), other]),
        );
        assert_eq!(filter.category_of(&existing), Some("open".to_string()));
        assert_eq!(log.lock().as_slice(), &["add 1 open"]);
    }

    #[test]
    fn test_transitions_only_when_requested() {
        let registry = registry();
        let class = registry.class("Phase").unwrap();
        let (plain, _) = state_filter(&class, FilterOptions::new());
        let (with_transitions, _) = state_filter(&class, FilterOptions::new().with_transitions());

        let entity = phase(&registry, 1, "open");
        let transition = WireMessage::new("Phase")
            .with_operation(Operation::Transition)
            .with("id", json!(1))
            .with("state", json!("closed"));
        registry.sync_receive(&transition, None).unwrap();

        assert_eq!(plain.category_of(&entity), Some("open".to_string()));
        assert_eq!(with_transitions.category_of(&entity), Some("closed".to_string()));
    }

    #[test]
    fn test_close_and_drop_unsubscribe() {
        let registry = registry();
        let class = registry.class("Phase").unwrap();

        let (mut filter, log) = state_filter(&class, FilterOptions::new());
        assert_eq!(class.events().handler_count(SyncEvent::Sync), 1);
        filter.close();
        filter.close();
        assert!(filter.is_closed());
        assert!(filter.target().is_none());
        assert_eq!(class.events().handler_count(SyncEvent::Sync), 0);
        phase(&registry, 1, "open");
        assert!(log.lock().is_empty());

        let (dropped, _) = state_filter(&class, FilterOptions::new());
        assert_eq!(class.events().handler_count(SyncEvent::Delete), 1);
        drop(dropped);
        assert_eq!(class.events().handler_count(SyncEvent::Delete), 0);
    }
}
