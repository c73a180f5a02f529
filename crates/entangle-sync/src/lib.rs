//! # Entangle Sync
//!
//! Connection manager for the Entangle protocol.
//!
//! ## Overview
//!
//! A [`SyncManager`] keeps one persistent connection to the server. It
//! reconnects with exponential backoff, routes inbound messages to receivers
//! by `_sync_type`, and correlates responses with the requests that asked for
//! them.
//!
//! ## Key Types
//!
//! - [`SyncManager`] - Connection lifecycle, routing and correlation
//! - [`Connector`] / [`Connection`] - Transport abstraction
//! - [`Response`] - Future resolving with a request's [`Outcome`]
//! - [`ManagerConfig`] / [`BackoffConfig`] - Configuration
//!
//! ## Usage
//!
//! ```rust,no_run
//! use entangle_core::{Reply, WireMessage};
//! use entangle_sync::{ManagerConfig, SyncManager, TcpConnector};
//!
//! async fn example() -> entangle_sync::Result<()> {
//!     let manager = SyncManager::new(ManagerConfig::new("tcp://127.0.0.1:9000"), TcpConnector);
//!     manager.on_receive("Widget", |msg, _cx| {
//!         println!("widget update: {msg:?}");
//!         Ok(Reply::Empty)
//!     });
//!     manager.start();
//!     manager.wait_open().await?;
//!
//!     let reply = manager.request(WireMessage::new("Widget"))?.await?;
//!     println!("{reply:?}");
//!     Ok(())
//! }
//! ```
//!
//! ## Connection States
//!
//! ```text
//! Idle ──start──> Connecting ──ok──> Open
//!                    ^   │             │
//!                    │  fail        lost
//!                    │   v             v
//!                    └─ Reconnecting <─┘
//!
//! any ──close──> Shutdown
//! ```

pub mod backoff;
pub mod config;
pub mod error;
pub mod manager;
pub mod tcp;
pub mod transport;

pub use backoff::Backoff;
pub use config::{BackoffConfig, ManagerConfig};
pub use error::{Result, SyncError};
pub use manager::{
    ConnectionState, Outcome, ReceiveContext, Receiver, ReceiverId, Response, SendOptions,
    SettleCallback, SyncManager,
};
pub use tcp::TcpConnector;
pub use transport::{
    memory::{MemoryConnector, MemoryListener, MemoryPeer},
    Connection, Connector,
};
