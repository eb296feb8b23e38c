//! Pushlink - Managed MQTT session lifecycle
//!
//! A managed publish/subscribe connection layer for push-style messaging:
//! hosts hand over connection parameters once and get a session that
//! establishes itself, subscribes to its inbound topic, survives failures
//! through scheduled reconnects, and honors an explicit "fully exit" so a
//! user who left stays disconnected across restarts.
//!
//! # Overview
//!
//! - Per-identity connection state machine (disconnected / connecting /
//!   connected / disconnecting) with a single failure-handling path
//! - Reconnect scheduling over a fixed doubling delay table (8s up to
//!   4096s, wrapping) with at most one pending retry per session
//! - Client registry enforcing one live session: connecting under a new
//!   identity retires the old one first
//! - Persisted connection record and exit flag, so sessions resume on
//!   restart unless the user fully exited
//! - Inbound messages forwarded to a subscriber channel, or rendered as
//!   notifications while the hosting app is backgrounded
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use pushlink::config::ConnectionConfig;
//! use pushlink::network::AlwaysReachable;
//! use pushlink::notify::AlwaysForeground;
//! use pushlink::session::SessionCoordinator;
//! use pushlink::storage::JsonFileStore;
//! use pushlink::transport::RumqttTransportFactory;
//! use std::sync::Arc;
//!
//! # struct NoopPresenter;
//! # impl pushlink::notify::NotificationPresenter for NoopPresenter {
//! #     fn show(&self, _: &str, _: &str, _: Option<&str>, _: Option<&str>) {}
//! # }
//! # async fn run() -> pushlink::error::SessionResult<()> {
//! let coordinator = SessionCoordinator::new(
//!     Arc::new(RumqttTransportFactory),
//!     Arc::new(JsonFileStore::new("/var/lib/pushlink")),
//!     Arc::new(AlwaysReachable),
//!     Arc::new(NoopPresenter),
//!     Arc::new(AlwaysForeground),
//! );
//!
//! let config = ConnectionConfig {
//!     broker_url: "mqtts://broker.example.com".to_string(),
//!     device_id: "device-42".to_string(),
//!     user_name: "alice".to_string(),
//!     password: "secret".to_string(),
//!     connect_timeout_secs: 30,
//!     keep_alive_secs: 60,
//!     notification_title: "Messages".to_string(),
//! };
//!
//! let outcome = coordinator.connect(config).await?;
//! println!("connect resolved as {outcome:?}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod network;
pub mod notify;
pub mod observability;
pub mod session;
pub mod storage;
pub mod testing;
pub mod transport;

pub use config::{ConnectionConfig, ConnectionIdentity};
pub use error::{SessionError, SessionResult};
pub use session::{
    ConnectOutcome, ConnectionState, InboundMessage, SessionCoordinator, SessionNotice,
};
pub use storage::{ConfigStore, JsonFileStore};
pub use transport::{RumqttTransport, RumqttTransportFactory};
