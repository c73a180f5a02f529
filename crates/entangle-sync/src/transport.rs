//! Transport abstraction for the connection manager.
//!
//! A [`Connector`] opens [`Connection`]s to a URL. A connection carries
//! text frames, each holding one JSON message. Implementations may use
//! WebSockets, TCP, or anything else that preserves frame boundaries.

use async_trait::async_trait;

use crate::error::Result;

/// Opens connections to the server.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection to `url`.
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>>;
}

/// An established, ordered, frame-preserving connection.
#[async_trait]
pub trait Connection: Send {
    /// Send one frame.
    async fn send(&mut self, frame: String) -> Result<()>;

    /// Receive the next frame, or `None` once the peer closed the connection.
    ///
    /// Must be cancel safe: the manager polls it inside `select!` and drops
    /// the future whenever another branch wins.
    async fn recv(&mut self) -> Result<Option<String>>;

    /// Close the connection.
    async fn close(&mut self) -> Result<()>;
}

/// An in-process transport for tests.
///
/// [`channel`](memory::channel) returns a connector for the client side and a
/// listener that yields the server end of every connection the client opens.
pub mod memory {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use entangle_core::WireMessage;
    use parking_lot::Mutex;
    use tokio::sync::mpsc;
    use tokio::time::Instant;
    use tracing::warn;

    use crate::error::SyncError;

    struct Shared {
        incoming: mpsc::UnboundedSender<MemoryPeer>,
        refusing: AtomicBool,
        attempts: Mutex<Vec<Instant>>,
    }

    /// Create a connected connector/listener pair.
    pub fn channel() -> (MemoryConnector, MemoryListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = MemoryConnector {
            shared: Arc::new(Shared {
                incoming: tx,
                refusing: AtomicBool::new(false),
                attempts: Mutex::new(Vec::new()),
            }),
        };
        (connector, MemoryListener { incoming: rx })
    }

    /// Client side of the in-memory transport.
    #[derive(Clone)]
    pub struct MemoryConnector {
        shared: Arc<Shared>,
    }

    impl MemoryConnector {
        /// Make subsequent connection attempts fail.
        pub fn set_refusing(&self, refusing: bool) {
            self.shared.refusing.store(refusing, Ordering::SeqCst);
        }

        /// When each connection attempt was made.
        pub fn attempts(&self) -> Vec<Instant> {
            self.shared.attempts.lock().clone()
        }
    }

    #[async_trait]
    impl Connector for MemoryConnector {
        async fn connect(&self, url: &str) -> Result<Box<dyn Connection>> {
            self.shared.attempts.lock().push(Instant::now());
            if self.shared.refusing.load(Ordering::SeqCst) {
                return Err(SyncError::ConnectionFailed(format!("{url}: refused")));
            }

            let (to_server, from_client) = mpsc::unbounded_channel();
            let (to_client, from_server) = mpsc::unbounded_channel();
            let peer = MemoryPeer {
                url: url.to_string(),
                to_client,
                from_client,
            };
            self.shared
                .incoming
                .send(peer)
                .map_err(|_| SyncError::ConnectionFailed(format!("{url}: no listener")))?;

            Ok(Box::new(MemoryConnection {
                tx: to_server,
                rx: from_server,
            }))
        }
    }

    /// Accepts the server end of in-memory connections.
    pub struct MemoryListener {
        incoming: mpsc::UnboundedReceiver<MemoryPeer>,
    }

    impl MemoryListener {
        /// Wait for the client to open a connection.
        pub async fn accept(&mut self) -> Option<MemoryPeer> {
            self.incoming.recv().await
        }
    }

    /// Server end of one in-memory connection. Dropping it closes the
    /// connection.
    pub struct MemoryPeer {
        url: String,
        to_client: mpsc::UnboundedSender<String>,
        from_client: mpsc::UnboundedReceiver<String>,
    }

    impl MemoryPeer {
        /// URL the client connected to.
        pub fn url(&self) -> &str {
            &self.url
        }

        /// Send a message to the client.
        pub fn send(&self, message: &WireMessage) -> Result<()> {
            self.send_frame(message.encode()?)
        }

        /// Send a raw frame to the client.
        pub fn send_frame(&self, frame: impl Into<String>) -> Result<()> {
            self.to_client
                .send(frame.into())
                .map_err(|_| SyncError::TransportError("client disconnected".into()))
        }

        /// Receive the next message from the client. Undecodable frames are
        /// skipped.
        pub async fn recv(&mut self) -> Option<WireMessage> {
            loop {
                let frame = self.from_client.recv().await?;
                match WireMessage::decode(&frame) {
                    Ok(message) => return Some(message),
                    Err(e) => warn!(error = %e, "memory peer skipped undecodable frame"),
                }
            }
        }

        /// Receive the next raw frame from the client.
        pub async fn recv_frame(&mut self) -> Option<String> {
            self.from_client.recv().await
        }
    }

    struct MemoryConnection {
        tx: mpsc::UnboundedSender<String>,
        rx: mpsc::UnboundedReceiver<String>,
    }

    #[async_trait]
    impl Connection for MemoryConnection {
        async fn send(&mut self, frame: String) -> Result<()> {
            self.tx
                .send(frame)
                .map_err(|_| SyncError::TransportError("peer disconnected".into()))
        }

        async fn recv(&mut self) -> Result<Option<String>> {
            Ok(self.rx.recv().await)
        }

        async fn close(&mut self) -> Result<()> {
            self.rx.close();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory;
    use super::*;
    use entangle_core::WireMessage;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_round_trip() {
        let (connector, mut listener) = memory::channel();
        let mut conn = connector.connect("memory://test").await.unwrap();
        let mut peer = listener.accept().await.unwrap();
        assert_eq!(peer.url(), "memory://test");

        conn.send(r#"{"_sync_type":"A"}"#.to_string()).await.unwrap();
        let msg = peer.recv().await.unwrap();
        assert_eq!(msg.sync_type(), Some("A"));

        peer.send(&WireMessage::new("B").with("x", json!(1))).unwrap();
        let frame = conn.recv().await.unwrap().unwrap();
        assert_eq!(WireMessage::decode(&frame).unwrap().get("x"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_memory_peer_drop_closes() {
        let (connector, mut listener) = memory::channel();
        let mut conn = connector.connect("memory://test").await.unwrap();
        drop(listener.accept().await.unwrap());
        assert!(conn.recv().await.unwrap().is_none());
        assert!(conn.send("{}".into()).await.is_err());
    }

    #[tokio::test]
    async fn test_memory_refusing() {
        let (connector, _listener) = memory::channel();
        connector.set_refusing(true);
        assert!(connector.connect("memory://test").await.is_err());
        assert_eq!(connector.attempts().len(), 1);
    }
}
