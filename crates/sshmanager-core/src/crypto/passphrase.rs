//! Passphrase sourcing.
//!
//! The passphrase for passphrase-derived keys is supplied by the caller,
//! usually from the environment. It is never persisted.

use secrecy::SecretString;

/// Environment variable holding the master passphrase.
pub const PASSPHRASE_ENV_VAR: &str = "SSHMANAGER_MASTER_PASSPHRASE";

/// Normalize a raw passphrase value.
///
/// Surrounding whitespace is trimmed; a blank value counts as "no passphrase"
/// rather than an empty one.
///
/// # Examples
///
/// ```
/// use sshmanager_core::crypto::normalize_passphrase;
///
/// assert!(normalize_passphrase("  hunter2  ").is_some());
/// assert!(normalize_passphrase(" \t\n").is_none());
/// ```
pub fn normalize_passphrase(raw: &str) -> Option<SecretString> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(SecretString::from(trimmed.to_string()))
}

/// Read the passphrase from environment variable `var`.
pub fn passphrase_from_env(var: &str) -> Option<SecretString> {
    std::env::var(var)
        .ok()
        .and_then(|value| normalize_passphrase(&value))
}
