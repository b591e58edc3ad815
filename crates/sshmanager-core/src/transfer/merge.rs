//! Merge and replace reconciliation of imported records.

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use super::normalize::normalize_record;
use crate::error::{Result, StoreError};
use crate::model::{ConnectionRecord, ConnectionStoreDocument};
use crate::storage::ConnectionStorage;

/// How imported records are reconciled with the stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportMode {
    /// Update matching records in place, append the rest.
    #[default]
    Merge,
    /// Discard the stored records and keep only the imported ones.
    Replace,
}

impl ImportMode {
    /// Parse `merge` or `replace` (trimmed, case-insensitive).
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "merge" => Ok(ImportMode::Merge),
            "replace" => Ok(ImportMode::Replace),
            other => Err(StoreError::Validation(format!(
                "unknown import mode {:?} (use merge or replace)",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ImportMode::Merge => "merge",
            ImportMode::Replace => "replace",
        }
    }
}

impl FromStr for ImportMode {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome counts of an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportSummary {
    pub added: usize,
    pub updated: usize,
    /// Records in the document after the import.
    pub total: usize,
}

/// Merge `incoming` into `target`.
///
/// Each record is normalized, then matched against `target` by ID and,
/// failing that, by alias (trimmed, case-insensitive). A match is replaced in
/// place keeping the stored ID; an alias match also keeps the stored alias
/// spelling. Unmatched records are appended through
/// [`ConnectionStoreDocument::add_connection`].
///
/// `target` is only modified if every record merges cleanly.
///
/// # Errors
///
/// Returns `StoreError::Validation` for a malformed record or
/// `StoreError::AliasConflict` when a record would duplicate another alias.
pub fn merge_into(
    target: &mut ConnectionStoreDocument,
    incoming: &[ConnectionRecord],
) -> Result<ImportSummary> {
    let mut merged = target.clone();
    let mut summary = ImportSummary::default();

    for raw in incoming {
        let mut record = normalize_record(raw.clone())?;

        let by_id = Some(record.id.trim())
            .filter(|id| !id.is_empty())
            .and_then(|id| merged.get_connection_by_id(id))
            .map(|existing| existing.id.clone());
        if let Some(id) = by_id {
            merged.update_connection_by_id(&id, record)?;
            summary.updated += 1;
            continue;
        }

        let by_alias = merged
            .get_connection_by_alias(&record.alias)
            .map(|existing| (existing.id.clone(), existing.alias.clone()));
        if let Some((id, alias)) = by_alias {
            record.alias = alias;
            merged.update_connection_by_id(&id, record)?;
            summary.updated += 1;
            continue;
        }

        merged.add_connection(record)?;
        summary.added += 1;
    }

    summary.total = merged.len();
    *target = merged;
    Ok(summary)
}

/// Build a fresh document from `incoming` alone.
///
/// # Errors
///
/// The first record that fails normalization or collides on alias aborts the
/// rebuild; no partial document is returned.
pub fn rebuild(incoming: &[ConnectionRecord]) -> Result<ConnectionStoreDocument> {
    let mut built = ConnectionStoreDocument::new();
    for raw in incoming {
        built.add_connection(normalize_record(raw.clone())?)?;
    }
    Ok(built)
}

/// Apply `incoming` to `store` in a single locked update.
///
/// Nothing is written unless the whole import succeeds.
pub fn import_connections<S: ConnectionStorage>(
    store: &S,
    incoming: &[ConnectionRecord],
    mode: ImportMode,
) -> Result<ImportSummary> {
    let summary = store.update(|document| match mode {
        ImportMode::Merge => merge_into(document, incoming),
        ImportMode::Replace => {
            *document = rebuild(incoming)?;
            Ok(ImportSummary {
                added: document.len(),
                updated: 0,
                total: document.len(),
            })
        }
    })?;
    debug!(
        mode = %mode,
        added = summary.added,
        updated = summary.updated,
        total = summary.total,
        "imported connections"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(alias: &str, host: &str) -> ConnectionRecord {
        ConnectionRecord::new("deploy", host).with_alias(alias)
    }

    #[test]
    fn test_import_mode_parse() {
        assert_eq!(ImportMode::parse(" Merge ").unwrap(), ImportMode::Merge);
        assert_eq!("REPLACE".parse::<ImportMode>().unwrap(), ImportMode::Replace);
        assert!(ImportMode::parse("append").is_err());
        assert_eq!(ImportMode::default().to_string(), "merge");
    }

    #[test]
    fn test_merge_by_alias_keeps_id_and_alias_spelling() {
        let mut target = ConnectionStoreDocument::new();
        let id = target.add_connection(record("prod", "host-a")).unwrap();

        let summary = merge_into(&mut target, &[record("PROD", "host-b")]).unwrap();
        assert_eq!(summary, ImportSummary { added: 0, updated: 1, total: 1 });

        let stored = &target.connections[0];
        assert_eq!(stored.id, id);
        assert_eq!(stored.alias, "prod");
        assert_eq!(stored.host, "host-b");
    }

    #[test]
    fn test_merge_by_id_takes_incoming_alias() {
        let mut target = ConnectionStoreDocument::new();
        let id = target.add_connection(record("old", "host-a")).unwrap();

        let mut incoming = record("new", "host-b");
        incoming.id = id.clone();
        merge_into(&mut target, &[incoming]).unwrap();

        assert_eq!(target.len(), 1);
        assert_eq!(target.get_connection_by_id(&id).unwrap().alias, "new");
    }

    #[test]
    fn test_merge_appends_unmatched() {
        let mut target = ConnectionStoreDocument::new();
        target.add_connection(record("web", "a")).unwrap();

        let mut unknown_id = record("db", "b");
        unknown_id.id = "not-in-target".to_string();
        let summary = merge_into(&mut target, &[unknown_id, record("", "c")]).unwrap();

        assert_eq!(summary, ImportSummary { added: 2, updated: 0, total: 3 });
        assert_eq!(target.connections[1].id, "not-in-target");
    }

    #[test]
    fn test_failed_merge_leaves_target_untouched() {
        let mut target = ConnectionStoreDocument::new();
        target.add_connection(record("web", "a")).unwrap();
        let before = target.clone();

        let mut bad = record("db", "b");
        bad.proxy_jump = "bad hop".to_string();
        let err = merge_into(&mut target, &[record("cache", "c"), bad]).unwrap_err();

        assert!(matches!(err, StoreError::Validation(_)));
        assert_eq!(target, before);
    }

    #[test]
    fn test_rebuild() {
        let built = rebuild(&[record("a", "a"), record("b", "b")]).unwrap();
        assert_eq!(built.len(), 2);
        assert_eq!(built.version, "1.0");

        let err = rebuild(&[record("a", "a"), record(" A ", "b")]).unwrap_err();
        assert!(matches!(err, StoreError::AliasConflict(_)));

        let err = rebuild(&[ConnectionRecord::new("", "h")]).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }
}
