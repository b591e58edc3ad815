//! Store locations and per-instance options.

use std::path::{Path, PathBuf};

use secrecy::SecretString;

use crate::crypto::{normalize_passphrase, passphrase_from_env, PASSPHRASE_ENV_VAR};
use crate::error::{Result, StoreError};
use crate::lock::{lock_path_for, LockOptions};

/// Environment variable overriding the store directory.
pub const HOME_ENV_VAR: &str = "SSHMANAGER_HOME";

/// Store directory name under `$HOME`.
pub const DEFAULT_DIR_NAME: &str = ".sshmanager";

/// Encrypted connection document file name.
pub const CONNECTION_FILE_NAME: &str = "conn";

/// Key file name.
pub const SECRET_KEY_FILE_NAME: &str = "secret.key";

/// Where the connection document and its key live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub connection_file: PathBuf,
    pub secret_key_file: PathBuf,
}

impl StorePaths {
    pub fn new(connection_file: impl Into<PathBuf>, secret_key_file: impl Into<PathBuf>) -> Self {
        Self {
            connection_file: connection_file.into(),
            secret_key_file: secret_key_file.into(),
        }
    }

    /// Default file names inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(
            dir.join(CONNECTION_FILE_NAME),
            dir.join(SECRET_KEY_FILE_NAME),
        )
    }

    /// Paths under `$SSHMANAGER_HOME`, or `$HOME/.sshmanager`.
    pub fn default_paths() -> Result<Self> {
        Ok(Self::in_dir(&default_store_dir()?))
    }

    /// Sentinel guarding the connection document.
    pub fn lock_file(&self) -> PathBuf {
        lock_path_for(&self.connection_file)
    }
}

pub fn default_store_dir() -> Result<PathBuf> {
    if let Ok(value) = std::env::var(HOME_ENV_VAR) {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value));
        }
    }
    Ok(home_dir()?.join(DEFAULT_DIR_NAME))
}

fn home_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| StoreError::Other("HOME is not set; cannot resolve default paths".into()))?;
    Ok(PathBuf::from(home))
}

/// Knobs for a single store instance.
#[derive(Debug, Default)]
pub struct StoreOptions {
    pub lock: LockOptions,
    pub passphrase: Option<SecretString>,
}

impl StoreOptions {
    /// Default lock timing with the passphrase from `SSHMANAGER_MASTER_PASSPHRASE`.
    pub fn from_env() -> Self {
        Self {
            lock: LockOptions::default(),
            passphrase: passphrase_from_env(PASSPHRASE_ENV_VAR),
        }
    }

    pub fn with_lock(mut self, lock: LockOptions) -> Self {
        self.lock = lock;
        self
    }

    /// Trimmed like the environment value; a blank passphrase counts as none.
    pub fn with_passphrase(mut self, passphrase: impl AsRef<str>) -> Self {
        self.passphrase = normalize_passphrase(passphrase.as_ref());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_paths_in_dir() {
        let paths = StorePaths::in_dir(Path::new("/tmp/store"));
        assert_eq!(paths.connection_file, PathBuf::from("/tmp/store/conn"));
        assert_eq!(paths.secret_key_file, PathBuf::from("/tmp/store/secret.key"));
        assert_eq!(paths.lock_file(), PathBuf::from("/tmp/store/conn.lock"));
    }

    #[test]
    fn test_options_builders() {
        let options = StoreOptions::default()
            .with_lock(LockOptions::default().with_timeout(Duration::from_secs(1)))
            .with_passphrase("pw");
        assert_eq!(options.lock.timeout, Duration::from_secs(1));
        assert!(options.passphrase.is_some());
        assert!(StoreOptions::default().passphrase.is_none());
    }

    #[test]
    fn test_blank_passphrase_counts_as_none() {
        use secrecy::ExposeSecret;

        assert!(StoreOptions::default().with_passphrase("  \t").passphrase.is_none());
        let options = StoreOptions::default().with_passphrase(" pw \n");
        assert_eq!(options.passphrase.unwrap().expose_secret(), "pw");
    }
}
