//! In-memory connection model.

pub mod connection;
pub mod document;
pub mod validation;

pub use connection::{resolve_auth_mode, AuthMode, ConnectionRecord, DEFAULT_SSH_PORT, MAX_PORT};
pub use document::{ConnectionStoreDocument, CURRENT_VERSION};
