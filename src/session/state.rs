//! Connection lifecycle states and failure classification

use std::fmt;

/// Lifecycle state of one managed session
///
/// `Connecting` covers the whole establishment sequence including the
/// inbound subscription; the session only reports `Connected` once the
/// broker has acknowledged both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl ConnectionState {
    /// Whether a new connect attempt may start from this state
    pub fn accepts_connect(&self) -> bool {
        matches!(self, ConnectionState::Disconnected)
    }

    /// A failure report arriving in these states refers to a session that
    /// was already torn down deliberately and must be ignored
    pub fn failure_is_stale(&self) -> bool {
        matches!(
            self,
            ConnectionState::Disconnected | ConnectionState::Disconnecting
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
        };
        write!(f, "{name}")
    }
}

/// How a connection failure must be cleaned up before the session can be
/// declared disconnected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The transport never came up; nothing to tear down
    Direct,
    /// A live or half-open transport exists and is torn down first
    DisconnectFirst,
}
