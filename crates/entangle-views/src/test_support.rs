use entangle_core::{EntityHandle, WireMessage};
use entangle_store::{Persistent, Registry};
use serde_json::{json, Value};

/// `Phase` rows belonging to `Team`s.
pub(crate) fn registry() -> Registry {
    let registry = Registry::new();
    registry
        .declare("Phase", ["id"], ["id", "state", "rank", "team_id"])
        .unwrap();
    registry.register("Phase", Persistent::new()).unwrap();
    registry.declare("Team", ["id"], ["id", "name"]).unwrap();
    registry.register("Team", Persistent::new()).unwrap();
    registry
}

fn receive(registry: &Registry, message: WireMessage) -> EntityHandle {
    registry.sync_receive(&message, None).unwrap()
}

pub(crate) fn phase(registry: &Registry, id: i64, state: &str) -> EntityHandle {
    receive(
        registry,
        WireMessage::new("Phase")
            .with("id", json!(id))
            .with("state", json!(state)),
    )
}

pub(crate) fn ranked(registry: &Registry, id: i64, rank: i64) -> EntityHandle {
    receive(
        registry,
        WireMessage::new("Phase")
            .with("id", json!(id))
            .with("rank", json!(rank)),
    )
}

pub(crate) fn phase_in_team(registry: &Registry, id: i64, team: &str) -> EntityHandle {
    receive(
        registry,
        WireMessage::new("Phase")
            .with("id", json!(id))
            .with("team_id", json!(team)),
    )
}

pub(crate) fn team(registry: &Registry, id: &str) -> EntityHandle {
    receive(registry, WireMessage::new("Team").with("id", json!(id)))
}

pub(crate) fn rank(entity: &EntityHandle) -> i64 {
    entity.get("rank").as_ref().and_then(Value::as_i64).unwrap_or(0)
}
