//! Error types for managed session operations
//!
//! Validation errors fail fast and are never retried; transport errors are
//! non-fatal and feed the reconnect machinery; storage errors are surfaced
//! but never abort a connect flow.

use crate::storage::StorageError;
use crate::transport::TransportError;
use thiserror::Error;

/// Main error type for session lifecycle operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid connect request: {field} must not be empty")]
    InvalidConfig { field: &'static str },

    #[error("Connect failed: {reason}")]
    ConnectFailed { reason: String },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl SessionError {
    /// Create a validation error for an empty required field
    pub fn invalid_config(field: &'static str) -> Self {
        Self::InvalidConfig { field }
    }

    /// Create a terminal connect failure
    pub fn connect_failed<S: Into<String>>(reason: S) -> Self {
        Self::ConnectFailed {
            reason: reason.into(),
        }
    }
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;
