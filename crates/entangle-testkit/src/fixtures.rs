//! Test fixtures: a sample schema and a scripted server.

use std::time::Duration;

use entangle_core::{fields, WireMessage};
use entangle_owner::{EPOCH, SYNC_OWNER};
use entangle_store::{Persistent, Registry};
use entangle_sync::transport::memory::{self, MemoryConnector, MemoryListener, MemoryPeer};
use serde_json::{json, Value};

/// How long the scripted server waits for the client before failing a test.
pub const PATIENCE: Duration = Duration::from_secs(5);

/// Schema document of the sample types.
pub const TEST_SCHEMA: &str = r#"[
    {"name": "Widget", "keys": ["id"], "attributes": ["id", "color", "size", "state"]},
    {"name": "Doc", "keys": ["id"], "attributes": ["id", "title"]}
]"#;

/// A registry with the sample types registered as persistent.
pub fn test_registry() -> Registry {
    let registry = Registry::new();
    registry
        .load_schema_json(TEST_SCHEMA)
        .expect("sample schema loads");
    for name in ["Widget", "Doc"] {
        registry
            .register(name, Persistent::new())
            .expect("sample type registers");
    }
    registry
}

pub fn widget(id: i64, color: &str) -> WireMessage {
    WireMessage::new("Widget")
        .with("id", json!(id))
        .with("color", json!(color))
}

pub fn owner(id: &str, epoch: i64) -> WireMessage {
    WireMessage::new(SYNC_OWNER)
        .with("id", json!(id))
        .with(EPOCH, json!(epoch))
}

pub fn owned_doc(id: &str, owner: &str) -> WireMessage {
    WireMessage::new("Doc")
        .with("id", json!(id))
        .with("title", json!(id.to_uppercase()))
        .with(fields::OWNER, json!(owner))
}

/// A frame the client sent, with the sequence number it consumed.
#[derive(Debug, Clone)]
pub struct Received {
    pub seq: u64,
    pub message: WireMessage,
}

/// The server end of an in-memory connection, numbering the client's
/// frames the way a server would.
pub struct TestServer {
    listener: MemoryListener,
    peer: Option<MemoryPeer>,
    received: u64,
}

/// A connector for the client plus the server it reaches.
pub fn memory_server() -> (MemoryConnector, TestServer) {
    let (connector, listener) = memory::channel();
    (connector, TestServer::new(listener))
}

impl TestServer {
    pub fn new(listener: MemoryListener) -> Self {
        Self {
            listener,
            peer: None,
            received: 0,
        }
    }

    /// Wait for the client to connect. Numbering restarts at 0.
    pub async fn accept(&mut self) {
        let peer = tokio::time::timeout(PATIENCE, self.listener.accept())
            .await
            .expect("client connects in time")
            .expect("connector still alive");
        self.peer = Some(peer);
        self.received = 0;
    }

    pub fn is_connected(&self) -> bool {
        self.peer.is_some()
    }

    fn peer(&self) -> &MemoryPeer {
        self.peer.as_ref().expect("no client connected")
    }

    /// Next message from the client.
    pub async fn recv(&mut self) -> Received {
        let peer = self.peer.as_mut().expect("no client connected");
        let message = tokio::time::timeout(PATIENCE, peer.recv())
            .await
            .expect("client sends in time")
            .expect("client still connected");
        let seq = self.received;
        self.received += 1;
        Received { seq, message }
    }

    /// Next message from the client, which must be of `sync_type`.
    pub async fn expect(&mut self, sync_type: &str) -> Received {
        let received = self.recv().await;
        assert_eq!(
            received.message.sync_type(),
            Some(sync_type),
            "unexpected message {:?}",
            received.message
        );
        received
    }

    pub fn send(&self, message: &WireMessage) {
        self.peer().send(message).expect("client still connected");
    }

    /// Answer request `seq` with `message`.
    pub fn respond(&self, seq: u64, message: WireMessage) {
        self.send(&message.with(fields::RESP_FOR, json!([seq])));
    }

    /// Reject request `seq`.
    pub fn reject(&self, seq: u64, message: WireMessage) {
        self.respond(seq, message.with(fields::IS_ERROR, Value::Bool(true)));
    }

    /// Answer request `seq` without a value.
    pub fn acknowledge(&self, seq: u64, sync_type: &str) {
        self.send(&WireMessage::new(sync_type).with(fields::NO_RESP_FOR, json!([seq])));
    }

    /// Drop the connection.
    pub fn disconnect(&mut self) {
        self.peer = None;
    }
}
