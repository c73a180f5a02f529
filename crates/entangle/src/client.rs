//! The client: a registry wired to a connection.
//!
//! A [`Client`] owns one [`SyncManager`] and the [`Registry`] its messages
//! are routed to. Types must be declared and registered before the client is
//! built, since building it associates every registered type with the
//! connection.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use entangle_core::{EntityHandle, StorageKey, TransitionPromise, WireMessage};
use entangle_owner::{declare_internal_schema, owner_storage, setup_persistence, SYNC_OWNER};
use entangle_store::{
    perform_transition, sync_create, sync_delete, sync_update, EventContext, RandomTransitionIds,
    Registry, SeededTransitionIds, SubscriptionId, SyncClass, SyncEvent, TransitionIdSource,
};
use entangle_sync::{BackoffConfig, Connector, ManagerConfig, ReceiverId, Response, SyncManager};
use entangle_views::{
    FilterOptions, ListFilter, MapFilter, NodeKind, Relationship, RelationshipOptions,
};
use serde_json::Value;
use tracing::info;

use crate::error::{EntangleError, Result};

/// Configuration for the client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Connection configuration.
    pub manager: ManagerConfig,
    /// Install the owner types (`SyncOwner`, `IHave`, `YouHave`, `MyOwners`).
    pub owners: bool,
    /// Seed for reproducible transition ids; random ids when unset.
    pub transition_seed: Option<u64>,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            manager: ManagerConfig::new(url),
            owners: true,
            transition_seed: None,
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.manager = self.manager.with_backoff(backoff);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.manager = self.manager.with_request_timeout(timeout);
        self
    }

    pub fn without_owners(mut self) -> Self {
        self.owners = false;
        self
    }

    pub fn with_transition_seed(mut self, seed: u64) -> Self {
        self.transition_seed = Some(seed);
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            manager: ManagerConfig::default(),
            owners: true,
            transition_seed: None,
        }
    }
}

/// An object-sync client.
pub struct Client {
    registry: Registry,
    manager: SyncManager,
    ids: Arc<dyn TransitionIdSource>,
}

impl Client {
    /// Wire `registry` to a new connection without starting it.
    pub fn new(
        config: ClientConfig,
        registry: Registry,
        connector: impl Connector + 'static,
    ) -> Result<Self> {
        if config.owners {
            install_owners(&registry)?;
        }
        let ids: Arc<dyn TransitionIdSource> = match config.transition_seed {
            Some(seed) => Arc::new(SeededTransitionIds::new(seed)),
            None => Arc::new(RandomTransitionIds),
        };

        let manager = SyncManager::new(config.manager, connector);
        let routed = registry.associate(&manager);
        info!(
            url = ?manager.url(),
            types = routed.len(),
            owners = config.owners,
            "client created"
        );
        Ok(Self {
            registry,
            manager,
            ids,
        })
    }

    /// Build the client and start connecting. Must be called within a tokio
    /// runtime.
    pub fn connect(
        config: ClientConfig,
        registry: Registry,
        connector: impl Connector + 'static,
    ) -> Result<Self> {
        let client = Self::new(config, registry, connector)?;
        client.start();
        Ok(client)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn manager(&self) -> &SyncManager {
        &self.manager
    }

    // ─────────────────────────────────────────────────────────────────────
    // Connection
    // ─────────────────────────────────────────────────────────────────────

    /// Start the connection task.
    pub fn start(&self) {
        self.manager.start();
    }

    /// Wait until the connection is open.
    pub async fn wait_open(&self) -> Result<()> {
        Ok(self.manager.wait_open().await?)
    }

    pub fn is_open(&self) -> bool {
        self.manager.is_open()
    }

    /// Route the messages of another registry's types through this client's
    /// connection.
    pub fn associate(&self, registry: &Registry) -> Vec<(String, ReceiverId)> {
        registry.associate(&self.manager)
    }

    /// Send a message without expecting a response.
    pub fn send(&self, message: WireMessage) -> Result<()> {
        Ok(self.manager.send(message)?)
    }

    /// Send a message and wait for the server's answer.
    pub async fn request(&self, message: WireMessage) -> Result<Option<EntityHandle>> {
        let reply = self.manager.request(message)?.await?;
        Ok(reply.entity().cloned())
    }

    /// Close the connection for good. Pending requests are dropped
    /// unanswered and observe `ResponseError::Abandoned`.
    pub fn close(&self) {
        self.manager.close();
    }

    // ─────────────────────────────────────────────────────────────────────
    // Types and instances
    // ─────────────────────────────────────────────────────────────────────

    pub fn class(&self, sync_type: &str) -> Result<SyncClass> {
        self.registry
            .class(sync_type)
            .ok_or_else(|| EntangleError::UnregisteredType(sync_type.to_string()))
    }

    /// A fresh, never-synced instance.
    pub fn create(&self, sync_type: &str) -> Result<EntityHandle> {
        Ok(self.registry.create(sync_type)?)
    }

    pub fn get(&self, sync_type: &str, key: &StorageKey) -> Option<EntityHandle> {
        self.registry.get(sync_type, key)
    }

    pub fn find(&self, sync_type: &str, values: &[&Value]) -> Option<EntityHandle> {
        self.registry.find(sync_type, values)
    }

    /// The owner with the given id, whatever owner type announced it.
    pub fn owner(&self, id: &Value) -> Option<EntityHandle> {
        owner_storage(&self.registry)?.find(&[id])
    }

    // ─────────────────────────────────────────────────────────────────────
    // Events
    // ─────────────────────────────────────────────────────────────────────

    /// Subscribe to registry-wide events.
    pub fn subscribe<F>(&self, event: SyncEvent, handler: F) -> SubscriptionId
    where
        F: Fn(&EventContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.registry.subscribe(event, handler)
    }

    /// Subscribe to the events of one type.
    pub fn subscribe_type<F>(
        &self,
        sync_type: &str,
        event: SyncEvent,
        handler: F,
    ) -> Result<SubscriptionId>
    where
        F: Fn(&EventContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Ok(self.class(sync_type)?.events().subscribe(event, handler))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Outbound changes
    // ─────────────────────────────────────────────────────────────────────

    /// Send `attributes` (default: modified plus primary keys) as an
    /// optimistic transition.
    pub fn transition(
        &self,
        entity: &EntityHandle,
        attributes: Option<Vec<String>>,
    ) -> Result<TransitionPromise> {
        Ok(perform_transition(
            &self.manager,
            entity,
            attributes,
            self.ids.as_ref(),
        )?)
    }

    pub fn sync_update(&self, entity: &EntityHandle) -> Result<Response> {
        Ok(sync_update(&self.manager, entity)?)
    }

    pub fn sync_create(&self, entity: &EntityHandle) -> Result<Response> {
        Ok(sync_create(&self.manager, entity)?)
    }

    pub fn sync_delete(&self, entity: &EntityHandle) -> Result<Response> {
        Ok(sync_delete(&self.manager, entity)?)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Views
    // ─────────────────────────────────────────────────────────────────────

    /// Instances of `sync_type` matching `predicate`, seeded from the
    /// identity map.
    pub fn list_filter<P>(
        &self,
        sync_type: &str,
        options: FilterOptions,
        predicate: P,
    ) -> Result<ListFilter>
    where
        P: Fn(&EntityHandle) -> bool + Send + Sync + 'static,
    {
        let class = self.class(sync_type)?;
        let options = seeded(&class, options);
        Ok(ListFilter::new(&class, options, predicate))
    }

    /// Instances of `sync_type` grouped by `key`, seeded from the identity
    /// map.
    pub fn map_filter<K, F>(
        &self,
        sync_type: &str,
        options: FilterOptions,
        kind: NodeKind,
        key: F,
    ) -> Result<MapFilter<K>>
    where
        K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
        F: Fn(&EntityHandle) -> Option<K> + Send + Sync + 'static,
    {
        let class = self.class(sync_type)?;
        let options = seeded(&class, options);
        Ok(MapFilter::new(&class, options, kind, key))
    }

    pub fn relationship<I, S>(
        &self,
        local: &str,
        remote: &str,
        keys: I,
        options: RelationshipOptions,
    ) -> Result<Relationship>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let local = self.class(local)?;
        let remote = self.class(remote)?;
        Ok(Relationship::new(&local, &remote, keys, options)?)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("manager", &self.manager)
            .field("registry", &self.registry)
            .finish()
    }
}

/// Declare and register the owner types unless already present.
fn install_owners(registry: &Registry) -> Result<()> {
    if !registry.is_declared(SYNC_OWNER) {
        declare_internal_schema(registry)?;
    }
    if registry.class(SYNC_OWNER).is_none() {
        setup_persistence(registry)?;
    }
    Ok(())
}

/// Seed from the type's identity map when the caller gave no collection.
fn seeded(class: &SyncClass, options: FilterOptions) -> FilterOptions {
    match class.storage() {
        Some(storage) if options.collection.is_empty() => options.with_collection(storage.values()),
        _ => options,
    }
}
