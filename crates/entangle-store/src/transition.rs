//! Optimistic transitions.
//!
//! A transition sends local changes to the server under a fresh id and
//! keeps them applied locally while the server decides. The first call
//! starts the transition and asks for a response; further calls while it is
//! outstanding send additional attributes under the same id and share its
//! result.
//!
//! If a message without the transition's id reaches the entity first, the
//! merge rolls the transition's attributes back to their snapshot values
//! (see [`ClassContext::merge`](crate::ClassContext::merge)) and the shared
//! result fails with [`ResponseError::BrokenTransition`], whatever the server
//! answers later. When the response settles, either way, the entity's
//! transition state is cleared, provided no newer transition replaced it.

use entangle_core::{EntityHandle, Operation, ResponseError, TransitionId, TransitionPromise};
use entangle_sync::{Outcome, Response, SendOptions, SyncError, SyncManager};
use futures::channel::oneshot;
use futures::future::{self, Either};
use futures::FutureExt;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::Result;

/// Source of transition ids.
pub trait TransitionIdSource: Send + Sync {
    fn next_id(&self) -> TransitionId;
}

/// Random v4 UUIDs from the operating system's generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomTransitionIds;

impl TransitionIdSource for RandomTransitionIds {
    fn next_id(&self) -> TransitionId {
        TransitionId::random()
    }
}

/// Reproducible v4 UUIDs from a seeded generator.
#[derive(Debug)]
pub struct SeededTransitionIds {
    rng: Mutex<StdRng>,
}

impl SeededTransitionIds {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl TransitionIdSource for SeededTransitionIds {
    fn next_id(&self) -> TransitionId {
        let bytes: [u8; 16] = self.rng.lock().gen();
        TransitionId::from_random_bytes(bytes)
    }
}

/// Attributes a transition sends by default: local modifications plus the
/// primary keys.
pub fn default_transition_attributes(entity: &EntityHandle) -> Vec<String> {
    let entity = entity.read();
    let mut attributes = entity.sync_modified();
    for key in entity.schema().primary_keys() {
        if !attributes.contains(key) {
            attributes.push(key.clone());
        }
    }
    attributes
}

/// Send `attributes` (default: modified plus primary keys) as a transition.
///
/// Returns the transition's shared result. Fails without side effects if the
/// message cannot be sent.
pub fn perform_transition(
    manager: &SyncManager,
    entity: &EntityHandle,
    attributes: Option<Vec<String>>,
    ids: &dyn TransitionIdSource,
) -> Result<TransitionPromise> {
    let attributes = attributes.unwrap_or_else(|| default_transition_attributes(entity));

    // The entity stays locked until the transition is fully recorded, so a
    // settlement racing in from the manager task waits for it.
    let mut guard = entity.write();

    if let Some(promise) = guard.pending_transition() {
        let message = guard
            .to_sync(Some(&attributes))
            .with_operation(Operation::Transition);
        manager.synchronize(message, SendOptions::new())?;
        guard.record_pre_transition(&attributes);
        return Ok(promise);
    }

    let id = ids.next_id();
    guard.begin_transition(id.clone());
    let broken = guard
        .break_signal()
        .unwrap_or_else(|| oneshot::channel().1);
    let message = guard
        .to_sync(Some(&attributes))
        .with_operation(Operation::Transition);

    let settling = entity.clone();
    let settle_id = id.clone();
    let options = SendOptions::new()
        .with_response()
        .on_settle(move |outcome| {
            if settling.write().settle_transition(&settle_id) {
                debug!(transition = %settle_id, ok = outcome.is_ok(), "transition settled");
            }
        });

    let sent = manager
        .synchronize(message, options)
        .and_then(|response| response.ok_or(SyncError::NotConnected));
    let response = match sent {
        Ok(response) => response,
        Err(e) => {
            guard.settle_transition(&id);
            return Err(e.into());
        }
    };

    let promise: TransitionPromise = breakable(response, broken, id.clone()).boxed().shared();
    guard.set_transition_promise(promise.clone());
    guard.record_pre_transition(&attributes);
    debug!(transition = %id, attributes = ?attributes, "transition started");
    Ok(promise)
}

/// Resolve with `response` unless the transition is broken first.
///
/// A break signal cancelled by settlement never wins.
async fn breakable(
    response: Response,
    broken: oneshot::Receiver<()>,
    id: TransitionId,
) -> Outcome {
    let breaking = async move {
        match broken.await {
            Ok(()) => ResponseError::BrokenTransition(id),
            Err(_) => future::pending().await,
        }
    };
    futures::pin_mut!(breaking);
    match future::select(breaking, response).await {
        Either::Left((error, _)) => Err(error),
        Either::Right((outcome, _)) => outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Persistent, Registry};
    use entangle_core::{ResponseError, WireMessage};
    use entangle_sync::transport::memory;
    use entangle_sync::{ManagerConfig, MemoryPeer};
    use serde_json::json;

    async fn setup() -> (Registry, SyncManager, MemoryPeer, memory::MemoryListener) {
        let registry = Registry::new();
        registry.declare("Widget", ["id"], ["id", "color", "size"]).unwrap();
        registry.register("Widget", Persistent::new()).unwrap();

        let (connector, mut listener) = memory::channel();
        let manager = SyncManager::new(ManagerConfig::new("memory://test"), connector);
        registry.associate(&manager);
        manager.start();
        let peer = listener.accept().await.unwrap();
        manager.wait_open().await.unwrap();
        (registry, manager, peer, listener)
    }

    fn widget(registry: &Registry) -> EntityHandle {
        let message = WireMessage::new("Widget")
            .with("id", json!(1))
            .with("color", json!("red"))
            .with("size", json!(1));
        registry.sync_receive(&message, None).unwrap()
    }

    #[test]
    fn test_seeded_ids_are_reproducible() {
        let a = SeededTransitionIds::new(7);
        let b = SeededTransitionIds::new(7);
        assert_eq!(a.next_id(), b.next_id());
        assert_ne!(a.next_id(), a.next_id());
    }

    #[tokio::test]
    async fn test_first_transition_sends_and_records() {
        let (registry, manager, mut peer, _listener) = setup().await;
        let entity = widget(&registry);
        entity.set("color", json!("blue"));

        let ids = SeededTransitionIds::new(1);
        let expected = SeededTransitionIds::new(1).next_id();
        perform_transition(&manager, &entity, None, &ids).unwrap();

        let sent = peer.recv().await.unwrap();
        assert_eq!(sent.operation(), "transition");
        assert!(sent.response_requested());
        assert_eq!(sent.transition_id(), Some(expected.clone()));
        assert_eq!(sent.get("color"), Some(&json!("blue")));
        assert_eq!(sent.get("id"), Some(&json!(1)));
        assert!(!sent.contains("size"));

        let guard = entity.read();
        let state = guard.transition().unwrap();
        assert_eq!(state.id(), &expected);
        assert_eq!(state.pre_transition().get("color"), Some(&Some(json!("red"))));
        assert!(state.promise().is_some());
    }

    #[tokio::test]
    async fn test_joined_transition_shares_result() {
        let (registry, manager, mut peer, _listener) = setup().await;
        let entity = widget(&registry);
        let ids = RandomTransitionIds;

        entity.set("color", json!("blue"));
        let first = perform_transition(&manager, &entity, None, &ids).unwrap();
        entity.set("size", json!(5));
        let second =
            perform_transition(&manager, &entity, Some(vec!["id".into(), "size".into()]), &ids)
                .unwrap();

        let a = peer.recv().await.unwrap();
        let b = peer.recv().await.unwrap();
        assert_eq!(a.transition_id(), b.transition_id());
        assert!(!b.response_requested());
        assert!(entity
            .read()
            .transition()
            .unwrap()
            .pre_transition()
            .contains_key("size"));

        // The server confirms, echoing the transition id.
        peer.send(
            &WireMessage::new("Widget")
                .with_operation(Operation::Transition)
                .with("id", json!(1))
                .with("color", json!("blue"))
                .with("size", json!(5))
                .with("transition_id", json!(a.transition_id().unwrap().as_str()))
                .with("_resp_for", json!([0])),
        )
        .unwrap();

        let reply = first.await.unwrap();
        assert!(reply.entity().unwrap().ptr_eq(&entity));
        assert!(second.await.is_ok());
        assert!(entity.read().transition().is_none());
        assert_eq!(entity.get("size"), Some(json!(5)));
    }

    #[tokio::test]
    async fn test_rejected_transition_clears_state() {
        let (registry, manager, mut peer, _listener) = setup().await;
        let entity = widget(&registry);
        entity.set("color", json!("blue"));
        let promise = perform_transition(&manager, &entity, None, &RandomTransitionIds).unwrap();
        let sent = peer.recv().await.unwrap();

        peer.send(
            &WireMessage::new("Widget")
                .with("id", json!(1))
                .with("transition_id", json!(sent.transition_id().unwrap().as_str()))
                .with("_sync_is_error", json!(true))
                .with("_resp_for", json!([0])),
        )
        .unwrap();

        assert!(matches!(promise.await, Err(ResponseError::Rejected(_))));
        assert!(entity.read().transition().is_none());
    }

    #[tokio::test]
    async fn test_response_under_other_id_breaks_transition() {
        let (registry, manager, mut peer, _listener) = setup().await;
        let entity = widget(&registry);
        entity.set("color", json!("blue"));
        let promise = perform_transition(&manager, &entity, None, &SeededTransitionIds::new(3))
            .unwrap();
        let sent = peer.recv().await.unwrap();
        let mine = sent.transition_id().unwrap();

        // Answered without an error flag, but under another transition.
        peer.send(
            &WireMessage::new("Widget")
                .with("id", json!(1))
                .with("color", json!("red"))
                .with("transition_id", json!(TransitionId::random().as_str()))
                .with("_resp_for", json!([0])),
        )
        .unwrap();

        match promise.await {
            Err(ResponseError::BrokenTransition(stale)) => assert_eq!(stale, mine),
            other => panic!("expected a broken transition, got {other:?}"),
        }
        assert_eq!(entity.get("color"), Some(json!("red")));
        assert!(entity.read().transition().is_none());
    }

    #[tokio::test]
    async fn test_break_rejects_before_any_response() {
        let (registry, manager, mut peer, _listener) = setup().await;
        let entity = widget(&registry);
        entity.set("size", json!(9));
        let promise =
            perform_transition(&manager, &entity, None, &RandomTransitionIds).unwrap();
        peer.recv().await.unwrap();

        // A plain sync for the same object, leaving `size` out.
        peer.send(&WireMessage::new("Widget").with("id", json!(1)).with("color", json!("red")))
            .unwrap();

        assert!(matches!(promise.await, Err(ResponseError::BrokenTransition(_))));
        assert_eq!(entity.get("size"), Some(json!(1)));
        assert_eq!(manager.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_send_failure_leaves_no_transition() {
        let (registry, manager, _peer, _listener) = setup().await;
        let entity = widget(&registry);
        manager.close();
        assert!(perform_transition(&manager, &entity, None, &RandomTransitionIds).is_err());
        assert!(entity.read().transition().is_none());
    }
}
