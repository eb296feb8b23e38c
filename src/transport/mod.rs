//! Transport layer for broker communication
//!
//! This module provides the transport abstraction the session core drives.
//! The wire protocol itself is an external collaborator: a connect /
//! disconnect / subscribe client with asynchronous completion, plus an
//! inbound event stream. [`rumqtt`] supplies the production implementation.

use crate::config::ConnectionConfig;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod rumqtt;

pub use rumqtt::{RumqttTransport, RumqttTransportFactory};

/// QoS used for the inbound subscription
pub const INBOUND_QOS: u8 = 1;

/// Transport-level errors; always non-fatal to the session core
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    ConnectFailed(String),
    #[error("Subscribe failed: {0}")]
    SubscribeFailed(String),
    #[error("Disconnect failed: {0}")]
    DisconnectFailed(String),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
}

/// Options for one transport connect attempt
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub broker_url: String,
    /// Used as the wire-level client id
    pub client_id: String,
    pub user_name: String,
    pub password: String,
    pub connect_timeout: Duration,
    pub keep_alive: Duration,
}

impl ConnectOptions {
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            broker_url: config.broker_url.clone(),
            client_id: config.device_id.clone(),
            user_name: config.user_name.clone(),
            password: config.password.clone(),
            connect_timeout: config.connect_timeout(),
            keep_alive: config.keep_alive(),
        }
    }
}

/// Inbound notifications delivered by the transport
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Message received on a subscribed topic
    MessageArrived { topic: String, payload: Vec<u8> },
    /// The established connection was lost
    ConnectionLost { reason: String },
    /// An outbound publish was acknowledged
    DeliveryComplete { token: u16 },
}

/// One underlying protocol session
///
/// Exclusively owned by its connection state machine; completion of every
/// operation is reported through the returned future, inbound notifications
/// through the event stream handed over at construction.
#[async_trait]
pub trait TransportClient: Send + Sync {
    /// Establish the session; resolves once the broker has acknowledged
    async fn connect(&self, options: &ConnectOptions) -> Result<(), TransportError>;

    /// Tear the session down; failure is still terminal for the session
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Subscribe to a topic filter at the given QoS
    async fn subscribe(&self, topic_filter: &str, qos: u8) -> Result<(), TransportError>;

    /// Whether the transport independently considers itself connected
    fn is_connected(&self) -> bool;
}

/// Builds a fresh transport plus its inbound event stream
pub trait TransportFactory: Send + Sync {
    fn create(&self) -> (Arc<dyn TransportClient>, mpsc::Receiver<TransportEvent>);
}

/// Topic construction for the managed session
pub struct TopicBuilder;

impl TopicBuilder {
    /// Inbound topic filter for an identity: `{user_name}/{device_id}/#`
    pub fn inbound_filter(user_name: &str, device_id: &str) -> String {
        format!("{user_name}/{device_id}/#")
    }
}
