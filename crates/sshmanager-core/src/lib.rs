//! # sshmanager core
//!
//! Encrypted, single-host store for SSH connection profiles.
//!
//! This crate owns everything with invariants: key material, authenticated
//! encryption of the document, atomic persistence, the mutation lock, the
//! document schema and its migration, and import/restore reconciliation.
//! Argument parsing, prompts and launching `ssh` live in the callers.
//!
//! ## Architecture
//!
//! - **crypto**: key file lifecycle, PBKDF2 derivation, AES-256-GCM
//! - **fs**: atomic replace-on-write and private file helpers
//! - **lock**: sentinel-file mutation lock
//! - **model**: connection records, the document, field validation
//! - **storage**: `ConnectionStorage` trait and the encrypted file store
//! - **transfer**: import normalization, merge/replace, export, backups
//! - **doctor**: read-only health checks
//!
//! ## Example
//!
//! ```no_run
//! use sshmanager_core::{ConnectionRecord, ConnectionStorage, ConnectionStore, StorePaths};
//!
//! # fn main() -> sshmanager_core::Result<()> {
//! let store = ConnectionStore::open(StorePaths::default_paths()?);
//! store.update(|doc| doc.add_connection(ConnectionRecord::new("deploy", "example.com")))?;
//! let document = store.load()?;
//! assert_eq!(document.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crypto;
pub mod doctor;
pub mod error;
pub mod fs;
pub mod lock;
pub mod model;
pub mod storage;
pub mod transfer;

pub use config::{StoreOptions, StorePaths};
pub use doctor::{diagnose, CheckStatus, DoctorCheck, DoctorReport};
pub use error::{Result, StoreError};
pub use lock::{LockOptions, MutationLock};
pub use model::{AuthMode, ConnectionRecord, ConnectionStoreDocument};
pub use storage::{ConnectionStorage, ConnectionStore};
pub use transfer::{BackupSnapshot, ImportMode, ImportSummary, TransferFormat};

/// Core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
