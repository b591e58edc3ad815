//! Error types for connection store operations.
//!
//! Errors are descriptive at the core level; callers (CLI, import tooling)
//! map these to user-facing messages. Nothing in this crate logs or swallows
//! an error on the caller's behalf.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Core error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Key file exists but is neither a raw key nor supported passphrase metadata
    #[error("Invalid key file: {0}")]
    KeyFormat(String),

    /// Key material handed to the cipher is not 32 bytes
    #[error("Invalid key size: got {got}, want {want}")]
    InvalidKey { got: usize, want: usize },

    /// Passphrase metadata is present but no passphrase was supplied
    #[error("Passphrase key file detected; set {env_var}")]
    PassphraseRequired { env_var: String },

    /// Ciphertext failed authentication (wrong key, tampering, truncation)
    #[error("Failed to decrypt data: authentication failed")]
    Authentication,

    /// Mutation lock could not be acquired in time
    #[error("Timed out acquiring mutation lock {} after {waited:?}", path.display())]
    LockTimeout { path: PathBuf, waited: Duration },

    /// Alias collides with another record (case-insensitive, trimmed)
    #[error("Alias already exists: {0}")]
    AliasConflict(String),

    /// Malformed record or record field
    #[error("Validation error: {0}")]
    Validation(String),

    /// Document content has an unsupported shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// Cipher or KDF failure unrelated to authentication
    #[error("Encryption error: {0}")]
    Crypto(String),

    /// Filesystem error
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Generic error (fallback)
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Parse(err.to_string())
    }
}

impl From<serde_yaml::Error> for StoreError {
    fn from(err: serde_yaml::Error) -> Self {
        StoreError::Parse(err.to_string())
    }
}
