//! Connection configuration and session identity
//!
//! A [`ConnectionConfig`] is built by the caller per connect request and is
//! the unit of persistence; serde field names match the persisted record
//! layout (`host`, `deviceUuid`, `userName`, ...). A [`ConnectionIdentity`]
//! is the immutable triple identifying one logical session; the password is
//! deliberately excluded from identity comparison.

use crate::error::{SessionError, SessionResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

fn default_connect_timeout() -> u64 {
    30
}

fn default_keep_alive() -> u64 {
    60
}

/// Parameters for one connect request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionConfig {
    /// Broker URL with scheme and optional port (`mqtt://` or `mqtts://`)
    #[serde(rename = "host")]
    pub broker_url: String,
    /// Device identifier, doubles as the transport client id
    #[serde(rename = "deviceUuid")]
    pub device_id: String,
    #[serde(rename = "userName")]
    pub user_name: String,
    pub password: String,
    /// Transport connect timeout in seconds
    #[serde(rename = "timeout", default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(rename = "keepAliveInterval", default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    /// Title used when an inbound message is rendered as a notification
    #[serde(rename = "notificationTitle", default)]
    pub notification_title: String,
}

impl ConnectionConfig {
    /// The identity this config would establish a session for
    pub fn identity(&self) -> ConnectionIdentity {
        ConnectionIdentity {
            broker_url: self.broker_url.clone(),
            device_id: self.device_id.clone(),
            user_name: self.user_name.clone(),
        }
    }

    /// Validate required fields; any empty field fails the request
    /// immediately with no retry
    pub fn validate(&self) -> SessionResult<()> {
        if self.broker_url.is_empty() {
            return Err(SessionError::invalid_config("broker_url"));
        }
        if self.device_id.is_empty() {
            return Err(SessionError::invalid_config("device_id"));
        }
        if self.user_name.is_empty() {
            return Err(SessionError::invalid_config("user_name"));
        }
        if self.password.is_empty() {
            return Err(SessionError::invalid_config("password"));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

/// The broker + device + user triple identifying one logical session
///
/// Two identities are equal iff all three fields match exactly. Immutable
/// once a session is established.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionIdentity {
    pub broker_url: String,
    pub device_id: String,
    pub user_name: String,
}

impl fmt::Display for ConnectionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}/{}", self.user_name, self.broker_url, self.device_id)
    }
}
