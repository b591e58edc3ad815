//! The connection document and its record-level invariants.
//!
//! After any store operation every record has a non-empty, document-unique
//! `id`, no two records share an alias (trimmed, case-insensitive), and the
//! version is never blank.

use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::connection::ConnectionRecord;
use crate::error::{Result, StoreError};

/// Schema version written by this crate.
pub const CURRENT_VERSION: &str = "1.0";

/// Versioned list of connection records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStoreDocument {
    #[serde(default, deserialize_with = "lenient_version")]
    pub version: String,
    #[serde(default, deserialize_with = "nullable_list")]
    pub connections: Vec<ConnectionRecord>,
}

fn lenient_version<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_yaml::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_yaml::Value::String(text)) => text,
        Some(serde_yaml::Value::Number(number)) => number.to_string(),
        _ => String::new(),
    })
}

fn nullable_list<'de, D>(deserializer: D) -> std::result::Result<Vec<ConnectionRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<ConnectionRecord>>::deserialize(deserializer)?.unwrap_or_default())
}

fn normalize_alias(alias: &str) -> String {
    alias.trim().to_lowercase()
}

fn new_connection_id() -> String {
    Uuid::new_v4().simple().to_string()
}

impl Default for ConnectionStoreDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStoreDocument {
    /// Empty document at the current version.
    pub fn new() -> Self {
        Self {
            version: CURRENT_VERSION.to_string(),
            connections: Vec::new(),
        }
    }

    /// Document holding `connections` as-is, without invariant checks.
    pub fn from_records(connections: Vec<ConnectionRecord>) -> Self {
        Self {
            version: CURRENT_VERSION.to_string(),
            connections,
        }
    }

    /// Parse decrypted document text.
    ///
    /// Blank content is a new empty document. Otherwise the current
    /// `{version, connections}` shape is tried first, then a bare legacy list.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Parse` when the content matches neither shape.
    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::new());
        }

        let value: serde_yaml::Value = serde_yaml::from_str(content)?;
        let mut document = if value.is_mapping() {
            serde_yaml::from_value::<Self>(value)?
        } else if value.is_sequence() {
            Self::from_records(serde_yaml::from_value(value)?)
        } else {
            return Err(StoreError::Parse(
                "unsupported connection document schema".to_string(),
            ));
        };
        document.normalize_version();
        Ok(document)
    }

    /// Serialize to document text.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub(crate) fn normalize_version(&mut self) {
        if self.version.trim().is_empty() {
            self.version = CURRENT_VERSION.to_string();
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Append `record`, trimming its alias and giving it a fresh ID if its own
    /// is blank or already taken. Returns the ID the record was stored under.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AliasConflict` if another record already uses the
    /// alias.
    pub fn add_connection(&mut self, mut record: ConnectionRecord) -> Result<String> {
        record.alias = record.alias.trim().to_string();
        if self.has_alias_conflict(&record.alias, None) {
            return Err(StoreError::AliasConflict(record.alias));
        }

        if record.id.trim().is_empty() || self.has_id(&record.id) {
            record.id = self.generate_unique_id();
        }
        let id = record.id.clone();
        self.connections.push(record);
        Ok(id)
    }

    /// Replace the record with `id` in place, keeping its ID.
    ///
    /// Returns `Ok(false)` if no such record exists.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AliasConflict` if a different record already uses
    /// the updated alias; the document is unchanged in that case.
    pub fn update_connection_by_id(
        &mut self,
        id: &str,
        mut updated: ConnectionRecord,
    ) -> Result<bool> {
        let Some(index) = self.position_by_id(id) else {
            return Ok(false);
        };

        updated.alias = updated.alias.trim().to_string();
        if self.has_alias_conflict(&updated.alias, Some(id)) {
            return Err(StoreError::AliasConflict(updated.alias));
        }
        updated.id = id.to_string();
        self.connections[index] = updated;
        Ok(true)
    }

    /// Remove the record with `id`, returning it if present.
    pub fn remove_connection_by_id(&mut self, id: &str) -> Option<ConnectionRecord> {
        let index = self.position_by_id(id)?;
        Some(self.connections.remove(index))
    }

    pub fn get_connection_by_id(&self, id: &str) -> Option<&ConnectionRecord> {
        self.connections.iter().find(|record| record.id == id)
    }

    /// Trimmed, case-insensitive alias lookup. A blank alias matches nothing.
    pub fn get_connection_by_alias(&self, alias: &str) -> Option<&ConnectionRecord> {
        let needle = normalize_alias(alias);
        if needle.is_empty() {
            return None;
        }
        self.connections
            .iter()
            .find(|record| normalize_alias(&record.alias) == needle)
    }

    /// Trimmed, non-blank aliases in document order.
    pub fn all_aliases(&self) -> Vec<String> {
        self.connections
            .iter()
            .map(|record| record.alias.trim())
            .filter(|alias| !alias.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Give every record with a blank or duplicate ID a fresh one.
    ///
    /// Returns `true` if any record changed. The first holder of an ID keeps it.
    pub fn ensure_ids(&mut self) -> bool {
        let mut changed = false;
        let mut seen: HashSet<String> = HashSet::with_capacity(self.connections.len());
        for record in &mut self.connections {
            let id = record.id.trim();
            if !id.is_empty() && !seen.contains(id) {
                seen.insert(id.to_string());
                continue;
            }
            record.id = generate_unseen_id(&mut seen);
            changed = true;
        }
        changed
    }

    fn position_by_id(&self, id: &str) -> Option<usize> {
        self.connections.iter().position(|record| record.id == id)
    }

    fn has_id(&self, id: &str) -> bool {
        self.position_by_id(id).is_some()
    }

    fn has_alias_conflict(&self, alias: &str, exclude_id: Option<&str>) -> bool {
        let needle = normalize_alias(alias);
        if needle.is_empty() {
            return false;
        }
        self.connections.iter().any(|record| {
            exclude_id != Some(record.id.as_str()) && normalize_alias(&record.alias) == needle
        })
    }

    fn generate_unique_id(&self) -> String {
        loop {
            let id = new_connection_id();
            if !self.has_id(&id) {
                return id;
            }
        }
    }
}

fn generate_unseen_id(seen: &mut HashSet<String>) -> String {
    loop {
        let id = new_connection_id();
        if seen.insert(id.clone()) {
            return id;
        }
    }
}
