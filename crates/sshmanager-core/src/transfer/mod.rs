//! Import, export, backup and restore of connection records.
//!
//! Everything entering the store from outside goes through
//! [`normalize_record`] and then either [`merge_into`] or [`rebuild`], applied
//! inside a single store update.

pub mod backup;
pub mod codec;
pub mod merge;
pub mod normalize;

pub use backup::{BackupSnapshot, BACKUP_VERSION};
pub use codec::{decode_document, encode_document, TransferFormat};
pub use merge::{import_connections, merge_into, rebuild, ImportMode, ImportSummary};
pub use normalize::normalize_record;
