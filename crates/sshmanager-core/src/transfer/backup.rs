//! Plaintext backup snapshots of the connection store.
//!
//! A snapshot wraps the decrypted document with a schema version, a creation
//! timestamp, and optionally the caller's configuration, which is carried
//! through untouched.

use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::codec::{decode_document, encode_value, TransferFormat};
use super::merge::{import_connections, ImportMode, ImportSummary};
use crate::error::{Result, StoreError};
use crate::model::ConnectionStoreDocument;
use crate::storage::ConnectionStorage;

/// Snapshot schema version written by this crate.
pub const BACKUP_VERSION: &str = "1";

/// A restorable copy of the connection document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSnapshot {
    pub backup_version: String,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
    pub connection_file: ConnectionStoreDocument,
}

/// Decoding view where every field may be absent.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartialSnapshot {
    #[serde(default)]
    backup_version: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    config: Option<serde_json::Value>,
    #[serde(default)]
    connection_file: Option<ConnectionStoreDocument>,
}

impl PartialSnapshot {
    fn is_snapshot(&self) -> bool {
        let present = |value: &Option<String>| {
            value.as_deref().is_some_and(|text| !text.trim().is_empty())
        };
        present(&self.backup_version)
            || present(&self.created_at)
            || self.config.is_some()
            || self
                .connection_file
                .as_ref()
                .is_some_and(|document| !document.version.trim().is_empty())
    }

    fn into_snapshot(self) -> BackupSnapshot {
        let non_blank = |value: Option<String>| value.filter(|text| !text.trim().is_empty());
        let mut connection_file = self.connection_file.unwrap_or_default();
        connection_file.normalize_version();
        BackupSnapshot {
            backup_version: non_blank(self.backup_version)
                .unwrap_or_else(|| BACKUP_VERSION.to_string()),
            created_at: non_blank(self.created_at).unwrap_or_else(now_rfc3339),
            config: self.config,
            connection_file,
        }
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl BackupSnapshot {
    /// Snapshot of `document` stamped with the current time.
    pub fn new(connection_file: ConnectionStoreDocument, config: Option<serde_json::Value>) -> Self {
        Self {
            backup_version: BACKUP_VERSION.to_string(),
            created_at: now_rfc3339(),
            config,
            connection_file,
        }
    }

    /// Snapshot the current contents of `store`.
    pub fn capture<S: ConnectionStorage>(
        store: &S,
        config: Option<serde_json::Value>,
    ) -> Result<Self> {
        Ok(Self::new(store.load()?, config))
    }

    /// Encode as YAML (also for `Auto`) or pretty JSON.
    pub fn encode(&self, format: TransferFormat) -> Result<String> {
        encode_value(self, format)
    }

    /// Decode a snapshot file.
    ///
    /// Plain exports (a document or a bare record list) are accepted too and
    /// wrapped into a fresh snapshot without config.
    pub fn decode(data: &str, format: TransferFormat, path: Option<&Path>) -> Result<Self> {
        if data.trim().is_empty() {
            return Err(StoreError::Validation("restore file is empty".to_string()));
        }

        match format.resolve(path) {
            TransferFormat::Json => Self::decode_json(data),
            TransferFormat::Yaml => Self::decode_yaml(data),
            TransferFormat::Auto => Self::decode_json(data)
                .or_else(|_| Self::decode_yaml(data))
                .map_err(|_| StoreError::Parse("failed to decode restore file".to_string())),
        }
    }

    fn decode_json(data: &str) -> Result<Self> {
        match serde_json::from_str::<PartialSnapshot>(data.trim()) {
            Ok(partial) if partial.is_snapshot() => Ok(partial.into_snapshot()),
            _ => Ok(Self::new(
                decode_document(data, TransferFormat::Json, None)?,
                None,
            )),
        }
    }

    fn decode_yaml(data: &str) -> Result<Self> {
        match serde_yaml::from_str::<PartialSnapshot>(data) {
            Ok(partial) if partial.is_snapshot() => Ok(partial.into_snapshot()),
            _ => Ok(Self::new(
                decode_document(data, TransferFormat::Yaml, None)?,
                None,
            )),
        }
    }

    /// Apply the snapshot's records to `store`.
    ///
    /// The config payload is left to the caller.
    pub fn restore_into<S: ConnectionStorage>(
        &self,
        store: &S,
        mode: ImportMode,
    ) -> Result<ImportSummary> {
        import_connections(store, &self.connection_file.connections, mode)
    }
}
