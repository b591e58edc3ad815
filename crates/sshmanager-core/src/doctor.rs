//! Read-only health checks for a connection store.
//!
//! `diagnose` never writes: it does not create a missing key, repair IDs, or
//! touch the lock sentinel.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use serde::Serialize;

use crate::fs::PRIVATE_FILE_MODE;
use crate::lock::sentinel_age;
use crate::storage::ConnectionStore;
use crate::transfer::normalize_record;

/// Severity of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Warn,
    Error,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CheckStatus::Ok => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DoctorCheck {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

/// Outcome of [`diagnose`]. `healthy` is false iff any check is an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DoctorReport {
    pub healthy: bool,
    pub checks: Vec<DoctorCheck>,
}

impl Default for DoctorReport {
    fn default() -> Self {
        Self {
            healthy: true,
            checks: Vec::new(),
        }
    }
}

impl DoctorReport {
    fn add(&mut self, name: &str, status: CheckStatus, detail: impl Into<String>) {
        if status == CheckStatus::Error {
            self.healthy = false;
        }
        self.checks.push(DoctorCheck {
            name: name.to_string(),
            status,
            detail: detail.into(),
        });
    }

    /// First check called `name`.
    pub fn check(&self, name: &str) -> Option<&DoctorCheck> {
        self.checks.iter().find(|check| check.name == name)
    }
}

/// Inspect `store` and report on its files, lock, key and records.
pub fn diagnose(store: &ConnectionStore) -> DoctorReport {
    let mut report = DoctorReport::default();
    let paths = store.paths();

    let connection_exists = check_file(&mut report, "connection file", &paths.connection_file);
    let key_exists = check_file(&mut report, "secret key file", &paths.secret_key_file);
    check_lock(&mut report, store);

    if !key_exists {
        report.add("key file format", CheckStatus::Error, "skipped: secret key file is missing");
        report.add("key derivation", CheckStatus::Error, "skipped: secret key file is missing");
    } else {
        match store.key_manager().read_material() {
            Ok(material) => report.add("key file format", CheckStatus::Ok, material.describe()),
            Err(err) => report.add("key file format", CheckStatus::Error, err.to_string()),
        }
        match store.key_manager().load_existing() {
            Ok(_) => report.add("key derivation", CheckStatus::Ok, "encryption key can be loaded"),
            Err(err) => report.add("key derivation", CheckStatus::Error, err.to_string()),
        }
    }

    if !connection_exists || !key_exists {
        report.add(
            "connection data load",
            CheckStatus::Error,
            "skipped: required connection/key file is missing",
        );
        return report;
    }

    let document = match store.inspect() {
        Ok(document) => document,
        Err(err) => {
            report.add("connection data load", CheckStatus::Error, err.to_string());
            return report;
        }
    };
    report.add(
        "connection data load",
        CheckStatus::Ok,
        format!("loaded {} connections", document.len()),
    );

    let invalid = document
        .connections
        .iter()
        .filter(|record| normalize_record((*record).clone()).is_err())
        .count();
    if invalid > 0 {
        report.add(
            "connection schema validation",
            CheckStatus::Error,
            format!("found {} invalid connection entries", invalid),
        );
    } else {
        report.add(
            "connection schema validation",
            CheckStatus::Ok,
            "all connections passed validation",
        );
    }

    let mut seen = HashSet::new();
    let duplicates: Vec<&str> = document
        .connections
        .iter()
        .map(|record| record.alias.trim())
        .filter(|alias| !alias.is_empty() && !seen.insert(alias.to_lowercase()))
        .collect();
    if duplicates.is_empty() {
        report.add("duplicate aliases", CheckStatus::Ok, "all aliases are unique");
    } else {
        report.add(
            "duplicate aliases",
            CheckStatus::Error,
            format!("duplicate aliases: {}", duplicates.join(", ")),
        );
    }

    report
}

fn check_file(report: &mut DoctorReport, name: &str, path: &Path) -> bool {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            report.add(name, CheckStatus::Error, format!("missing: {}", path.display()));
            return false;
        }
        Err(err) => {
            report.add(
                name,
                CheckStatus::Error,
                format!("failed to stat {}: {}", path.display(), err),
            );
            return false;
        }
    };
    if metadata.is_dir() {
        report.add(
            name,
            CheckStatus::Error,
            format!("expected file but found directory: {}", path.display()),
        );
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = metadata.permissions().mode() & 0o777;
        if mode != PRIVATE_FILE_MODE {
            report.add(
                name,
                CheckStatus::Warn,
                format!("file mode is {:o} (recommended 600): {}", mode, path.display()),
            );
            return true;
        }
    }
    report.add(name, CheckStatus::Ok, format!("exists: {}", path.display()));
    true
}

fn check_lock(report: &mut DoctorReport, store: &ConnectionStore) {
    let lock_path = store.lock_path();
    match sentinel_age(&lock_path) {
        None => report.add("connection lock file", CheckStatus::Ok, "no active lock file"),
        Some(age) if age > store.lock_options().stale_after => report.add(
            "connection lock file",
            CheckStatus::Warn,
            format!(
                "stale lock file ({}s old) will be broken on next write: {}",
                age.as_secs(),
                lock_path.display()
            ),
        ),
        Some(_) => report.add(
            "connection lock file",
            CheckStatus::Warn,
            format!("lock file exists: {}", lock_path.display()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StoreOptions, StorePaths};
    use crate::crypto::encrypt;
    use crate::model::ConnectionRecord;
    use crate::storage::ConnectionStorage;
    use tempfile::tempdir;

    fn store_in(dir: &Path) -> ConnectionStore {
        ConnectionStore::new(StorePaths::in_dir(dir), StoreOptions::default())
    }

    #[test]
    fn test_missing_store_is_unhealthy() {
        let dir = tempdir().unwrap();
        let report = diagnose(&store_in(dir.path()));

        assert!(!report.healthy);
        assert_eq!(report.check("connection file").unwrap().status, CheckStatus::Error);
        assert_eq!(report.check("key derivation").unwrap().status, CheckStatus::Error);
        // Diagnosis never creates the key.
        assert!(!dir.path().join("secret.key").exists());
    }

    #[test]
    fn test_healthy_store() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        store
            .update(|doc| doc.add_connection(ConnectionRecord::new("u", "h").with_alias("web")))
            .unwrap();

        let report = diagnose(&store);
        assert!(report.healthy, "{:#?}", report);
        assert_eq!(report.check("connection lock file").unwrap().status, CheckStatus::Ok);
        assert!(report
            .check("connection data load")
            .unwrap()
            .detail
            .contains("1 connections"));
    }

    #[test]
    fn test_duplicate_aliases_and_invalid_records_are_reported() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        store.initialize_if_empty().unwrap();

        let key = store.key_manager().load_existing().unwrap();
        let content = "version: \"1.0\"\nconnections:\n  - id: a\n    username: u\n    host: h\n    alias: web\n  - id: b\n    username: u\n    host: h\n    alias: WEB\n  - id: c\n    username: ''\n    host: h\n";
        let blob = encrypt(content.as_bytes(), key.as_bytes()).unwrap();
        fs::write(&store.paths().connection_file, blob).unwrap();

        let report = diagnose(&store);
        assert!(!report.healthy);
        let duplicates = report.check("duplicate aliases").unwrap();
        assert_eq!(duplicates.status, CheckStatus::Error);
        assert!(duplicates.detail.contains("WEB"));
        let schema = report.check("connection schema validation").unwrap();
        assert!(schema.detail.contains("found 1 invalid"));
    }

    #[cfg(unix)]
    #[test]
    fn test_loose_permissions_warn() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        store.initialize_if_empty().unwrap();
        fs::set_permissions(
            &store.paths().connection_file,
            fs::Permissions::from_mode(0o644),
        )
        .unwrap();

        let report = diagnose(&store);
        let check = report.check("connection file").unwrap();
        assert_eq!(check.status, CheckStatus::Warn);
        assert!(check.detail.contains("644"));
        assert!(report.healthy);
    }

    #[test]
    fn test_lock_sentinel_is_reported() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        store.initialize_if_empty().unwrap();
        fs::write(store.lock_path(), "pid=1\n").unwrap();

        let report = diagnose(&store);
        assert_eq!(report.check("connection lock file").unwrap().status, CheckStatus::Warn);
        assert!(store.lock_path().exists());
    }

    #[test]
    fn test_key_format_is_described() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        store.initialize_if_empty().unwrap();

        let report = diagnose(&store);
        assert_eq!(report.check("key file format").unwrap().detail, "raw AES-256 key");
    }

    #[test]
    fn test_report_serializes_lowercase_status() {
        let mut report = DoctorReport::default();
        report.add("lock", CheckStatus::Warn, "held");
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"status\":\"warn\""));
        assert!(report.healthy);
    }
}
