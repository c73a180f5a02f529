//! # Entangle Testkit
//!
//! Testing utilities for Entangle.
//!
//! ## Overview
//!
//! - **Fixtures**: a sample schema and registry, message builders, and a
//!   scripted [`TestServer`] that numbers the client's frames the way a real
//!   server does
//! - **Generators**: proptest strategies for messages and configurations
//!
//! ## Scripted Server
//!
//! ```rust
//! use entangle_sync::{ManagerConfig, SyncManager};
//! use entangle_testkit::fixtures::{memory_server, widget};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (connector, mut server) = memory_server();
//! let manager = SyncManager::connect(ManagerConfig::new("memory://doc"), connector);
//! server.accept().await;
//!
//! let pending = manager.request(widget(1, "red")).unwrap();
//! let request = server.expect("Widget").await;
//! server.respond(request.seq, widget(1, "blue"));
//! assert!(pending.await.is_ok());
//! # }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use entangle_testkit::generators::{widget_entity, widget_from_params, WidgetParams};
//!
//! proptest! {
//!     #[test]
//!     fn replay_is_harmless(params: WidgetParams) {
//!         let mut entity = widget_entity();
//!         entity.merge(&widget_from_params(&params));
//!         let once = entity.attributes().clone();
//!         entity.merge(&widget_from_params(&params));
//!         prop_assert_eq!(entity.attributes(), &once);
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{memory_server, test_registry, Received, TestServer, TEST_SCHEMA};
pub use generators::{widget_from_params, WidgetParams};
