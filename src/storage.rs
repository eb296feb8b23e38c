//! Durable storage for the last-used connection parameters and the exit flag
//!
//! Two named namespaces mirror the persisted layout: `mqtt_config` holds the
//! single connection record, `client_config` holds the boolean exit flag
//! ("the user has fully left the app; do not auto-reconnect"). Every call is
//! atomic: writes go to a temp file that is renamed into place, so no
//! partial record is ever visible.

use crate::config::ConnectionConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Namespace for the persisted connection record
pub const CONFIG_NAMESPACE: &str = "mqtt_config";
/// Namespace for client-level state (the exit flag)
pub const CLIENT_NAMESPACE: &str = "client_config";

/// Storage errors; best-effort on the connect path, surfaced on direct use
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Malformed record: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Durable store of connection parameters and the exit flag
pub trait ConfigStore: Send + Sync {
    /// Persist the connection record, replacing any previous one
    fn save(&self, config: &ConnectionConfig) -> Result<(), StorageError>;

    /// Load the last persisted record, if any
    fn load(&self) -> Result<Option<ConnectionConfig>, StorageError>;

    /// Persist the exit flag
    fn set_exit_flag(&self, exit: bool) -> Result<(), StorageError>;

    /// Read the exit flag; absent storage reads as `false`
    fn exit_flag(&self) -> Result<bool, StorageError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct ClientRecord {
    exit: bool,
}

/// File-backed [`ConfigStore`] keeping one JSON file per namespace
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn namespace_path(&self, namespace: &str) -> PathBuf {
        self.dir.join(format!("{namespace}.json"))
    }

    /// Write-then-rename so readers never observe a partial record
    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn read_optional(&self, path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl ConfigStore for JsonFileStore {
    fn save(&self, config: &ConnectionConfig) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(config)?;
        self.write_atomic(&self.namespace_path(CONFIG_NAMESPACE), &bytes)?;
        debug!(namespace = CONFIG_NAMESPACE, "persisted connection record");
        Ok(())
    }

    fn load(&self) -> Result<Option<ConnectionConfig>, StorageError> {
        match self.read_optional(&self.namespace_path(CONFIG_NAMESPACE))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn set_exit_flag(&self, exit: bool) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(&ClientRecord { exit })?;
        self.write_atomic(&self.namespace_path(CLIENT_NAMESPACE), &bytes)?;
        debug!(namespace = CLIENT_NAMESPACE, exit, "persisted exit flag");
        Ok(())
    }

    fn exit_flag(&self) -> Result<bool, StorageError> {
        match self.read_optional(&self.namespace_path(CLIENT_NAMESPACE))? {
            Some(bytes) => {
                let record: ClientRecord = serde_json::from_slice(&bytes)?;
                Ok(record.exit)
            }
            None => Ok(false),
        }
    }
}
