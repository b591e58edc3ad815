//! Key material lifecycle.
//!
//! The store key is 32 bytes. It is either kept raw in the key file, or
//! recomputed at every load from an externally supplied passphrase using
//! PBKDF2-HMAC-SHA256; in that case the key file only holds the derivation
//! metadata (salt and iteration count), never the passphrase or the key.

use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::passphrase::PASSPHRASE_ENV_VAR;
use crate::error::{Result, StoreError};
use crate::fs::{ensure_private_dir, write_new_atomic, PRIVATE_FILE_MODE};

/// Length of the store key in bytes (AES-256).
pub const KEY_LENGTH: usize = 32;

/// Length of the random PBKDF2 salt.
pub const SALT_LENGTH: usize = 16;

/// PBKDF2 iteration count for newly created passphrase key files.
pub const PBKDF2_ITERATIONS: u32 = 600_000;

/// `mode` value of passphrase key metadata.
pub const PASSPHRASE_KEY_MODE: &str = "passphrase";

/// `kdf` value of passphrase key metadata.
pub const PASSPHRASE_KEY_KDF: &str = "pbkdf2-sha256";

/// Only supported metadata version.
pub const PASSPHRASE_KEY_VERSION: u32 = 1;

/// The 32-byte symmetric key protecting the connection document.
///
/// Zeroized from memory on drop; `Debug` never prints the bytes.
#[derive(Clone, ZeroizeOnDrop)]
pub struct SecretKey {
    key: [u8; KEY_LENGTH],
}

impl SecretKey {
    pub(crate) fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self { key: bytes }
    }

    /// Build a key from an arbitrary slice, rejecting anything but 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LENGTH] = bytes.try_into().map_err(|_| StoreError::InvalidKey {
            got: bytes.len(),
            want: KEY_LENGTH,
        })?;
        Ok(Self { key })
    }

    /// Generate a key from the operating system RNG.
    pub fn generate() -> Result<Self> {
        let mut key = [0u8; KEY_LENGTH];
        getrandom::getrandom(&mut key)
            .map_err(|e| StoreError::Crypto(format!("Failed to generate key: {}", e)))?;
        Ok(Self { key })
    }

    /// Raw key bytes. Use only for immediate cipher operations.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// On-disk metadata for a passphrase-derived key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassphraseKeyFile {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub kdf: String,
    #[serde(default)]
    pub iterations: u32,
    #[serde(default)]
    pub salt: String,
}

impl PassphraseKeyFile {
    /// Fresh version-1 metadata around `salt`.
    pub fn new(salt: &[u8], iterations: u32) -> Self {
        Self {
            version: PASSPHRASE_KEY_VERSION,
            mode: PASSPHRASE_KEY_MODE.to_string(),
            kdf: PASSPHRASE_KEY_KDF.to_string(),
            iterations,
            salt: STANDARD.encode(salt),
        }
    }

    /// Reject metadata this build cannot derive a key from.
    pub fn validate(&self) -> Result<()> {
        if self.mode != PASSPHRASE_KEY_MODE {
            return Err(StoreError::KeyFormat(format!(
                "unsupported key file mode: {:?}",
                self.mode
            )));
        }
        if self.version != PASSPHRASE_KEY_VERSION {
            return Err(StoreError::KeyFormat(format!(
                "unsupported key file version: {}",
                self.version
            )));
        }
        if !self.kdf.is_empty() && self.kdf != PASSPHRASE_KEY_KDF {
            return Err(StoreError::KeyFormat(format!(
                "unsupported key derivation function: {:?}",
                self.kdf
            )));
        }
        Ok(())
    }

    /// Decoded salt bytes.
    pub fn salt_bytes(&self) -> Result<Vec<u8>> {
        let salt = STANDARD
            .decode(self.salt.trim())
            .map_err(|e| StoreError::KeyFormat(format!("invalid key file salt: {}", e)))?;
        if salt.is_empty() {
            return Err(StoreError::KeyFormat("key file salt is empty".to_string()));
        }
        Ok(salt)
    }

    /// Stored iteration count, falling back to the default when unset.
    pub fn effective_iterations(&self) -> u32 {
        if self.iterations == 0 {
            PBKDF2_ITERATIONS
        } else {
            self.iterations
        }
    }

    /// Recompute the key from `passphrase` and the stored parameters.
    pub fn derive(&self, passphrase: &str) -> Result<SecretKey> {
        self.validate()?;
        derive_key(passphrase, &self.salt_bytes()?, self.effective_iterations())
    }
}

/// Contents of a key file.
#[derive(Debug)]
pub enum KeyMaterial {
    /// Exactly 32 raw key bytes.
    Raw(SecretKey),
    /// Passphrase derivation metadata.
    Passphrase(PassphraseKeyFile),
}

impl KeyMaterial {
    /// Classify key file bytes: 32 bytes are a raw key, anything else must be
    /// passphrase metadata.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() == KEY_LENGTH {
            return Ok(KeyMaterial::Raw(SecretKey::from_slice(bytes)?));
        }

        let meta: PassphraseKeyFile = serde_json::from_slice(bytes).map_err(|_| {
            StoreError::KeyFormat(format!(
                "expected {} raw bytes or passphrase metadata",
                KEY_LENGTH
            ))
        })?;
        meta.validate()?;
        Ok(KeyMaterial::Passphrase(meta))
    }

    /// Short human-readable description of the key mode.
    pub fn describe(&self) -> String {
        match self {
            KeyMaterial::Raw(_) => "raw AES-256 key".to_string(),
            KeyMaterial::Passphrase(meta) => format!(
                "{} ({}, {} iterations)",
                meta.mode,
                meta.kdf,
                meta.effective_iterations()
            ),
        }
    }
}

/// Derive a 32-byte key from a passphrase with PBKDF2-HMAC-SHA256.
///
/// Same passphrase, salt and iteration count always yield the same key.
///
/// # Examples
///
/// ```
/// use sshmanager_core::crypto::derive_key;
///
/// let salt = b"sixteen-byte-slt";
/// let a = derive_key("correct horse", salt, 1_000).unwrap();
/// let b = derive_key("correct horse", salt, 1_000).unwrap();
/// assert_eq!(a.as_bytes(), b.as_bytes());
/// ```
pub fn derive_key(passphrase: &str, salt: &[u8], iterations: u32) -> Result<SecretKey> {
    if passphrase.is_empty() {
        return Err(StoreError::Crypto("Passphrase cannot be empty".to_string()));
    }
    if iterations == 0 {
        return Err(StoreError::Crypto(
            "PBKDF2 iteration count must be positive".to_string(),
        ));
    }

    let mut key = [0u8; KEY_LENGTH];
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, iterations, &mut key);
    let derived = SecretKey::from_bytes(key);
    key.zeroize();
    Ok(derived)
}

/// Loads the store key from its key file, creating the file on first use.
#[derive(Debug)]
pub struct KeyManager {
    path: PathBuf,
    passphrase: Option<SecretString>,
}

impl KeyManager {
    /// Key manager for `path` with an explicitly supplied passphrase.
    pub fn new(path: impl Into<PathBuf>, passphrase: Option<SecretString>) -> Self {
        Self {
            path: path.into(),
            passphrase,
        }
    }

    /// Path of the key file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the key, creating a new key file when none exists.
    ///
    /// # Errors
    ///
    /// - `StoreError::KeyFormat` for unsupported or malformed metadata
    /// - `StoreError::PassphraseRequired` when the file holds passphrase
    ///   metadata and no passphrase was supplied
    /// - `StoreError::Io` on filesystem failures
    pub fn load_or_create(&self) -> Result<SecretKey> {
        match fs::read(&self.path) {
            Ok(bytes) => self.key_from_material(KeyMaterial::parse(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => self.create(),
            Err(err) => Err(err.into()),
        }
    }

    /// Load the key from an existing key file; never creates one.
    pub fn load_existing(&self) -> Result<SecretKey> {
        self.key_from_material(self.read_material()?)
    }

    /// Read and classify the key file without deriving anything.
    pub fn read_material(&self) -> Result<KeyMaterial> {
        KeyMaterial::parse(&fs::read(&self.path)?)
    }

    fn key_from_material(&self, material: KeyMaterial) -> Result<SecretKey> {
        match material {
            KeyMaterial::Raw(key) => Ok(key),
            KeyMaterial::Passphrase(meta) => {
                let passphrase =
                    self.passphrase
                        .as_ref()
                        .ok_or_else(|| StoreError::PassphraseRequired {
                            env_var: PASSPHRASE_ENV_VAR.to_string(),
                        })?;
                meta.derive(passphrase.expose_secret())
            }
        }
    }

    fn create(&self) -> Result<SecretKey> {
        if let Some(parent) = self.path.parent() {
            ensure_private_dir(parent)?;
        }

        let (key, contents) = match &self.passphrase {
            Some(passphrase) => {
                let mut salt = [0u8; SALT_LENGTH];
                getrandom::getrandom(&mut salt)
                    .map_err(|e| StoreError::Crypto(format!("Failed to generate salt: {}", e)))?;
                let key = derive_key(passphrase.expose_secret(), &salt, PBKDF2_ITERATIONS)?;
                let meta = PassphraseKeyFile::new(&salt, PBKDF2_ITERATIONS);
                (key, zeroize::Zeroizing::new(serde_json::to_vec(&meta)?))
            }
            None => {
                let key = SecretKey::generate()?;
                let raw = zeroize::Zeroizing::new(key.as_bytes().to_vec());
                (key, raw)
            }
        };

        if write_new_atomic(&self.path, &contents, PRIVATE_FILE_MODE)? {
            debug!(path = %self.path.display(), passphrase = self.passphrase.is_some(), "created key file");
            Ok(key)
        } else {
            // Another writer won the race; its key is the one on disk.
            self.key_from_material(self.read_material()?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const TEST_ITERATIONS: u32 = 1_000;

    fn secret(value: &str) -> Option<SecretString> {
        Some(SecretString::from(value.to_string()))
    }

    fn write_metadata(path: &Path, meta: &PassphraseKeyFile) {
        fs::write(path, serde_json::to_vec(meta).unwrap()).unwrap();
    }

    #[test]
    fn test_key_derivation_deterministic() {
        let salt = b"unique-salt-1234";

        let key1 = derive_key("test-passphrase", salt, TEST_ITERATIONS).unwrap();
        let key2 = derive_key("test-passphrase", salt, TEST_ITERATIONS).unwrap();

        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_different_passphrase_different_key() {
        let salt = b"fixed-salt-12345";

        let key1 = derive_key("passphrase-one", salt, TEST_ITERATIONS).unwrap();
        let key2 = derive_key("passphrase-two", salt, TEST_ITERATIONS).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_empty_passphrase_rejected() {
        let result = derive_key("", b"salt-1234567890ab", TEST_ITERATIONS);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Passphrase cannot be empty"));
    }

    #[test]
    fn test_secret_key_debug_redacts() {
        let key = SecretKey::from_bytes([0xab; KEY_LENGTH]);
        let debug_output = format!("{:?}", key);

        assert!(debug_output.contains("REDACTED"));
        assert!(!debug_output.contains(&hex::encode(&key.as_bytes()[..4])));
    }

    #[test]
    fn test_secret_key_rejects_wrong_length() {
        assert!(matches!(
            SecretKey::from_slice(&[0u8; 31]),
            Err(StoreError::InvalidKey { got: 31, want: 32 })
        ));
    }

    #[test]
    fn test_missing_file_without_passphrase_creates_raw_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keys").join("secret.key");
        let manager = KeyManager::new(&path, None);

        let key = manager.load_or_create().unwrap();

        let on_disk = fs::read(&path).unwrap();
        assert_eq!(on_disk.len(), KEY_LENGTH);
        assert_eq!(on_disk.as_slice(), key.as_bytes());

        let again = manager.load_or_create().unwrap();
        assert_eq!(again.as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_losing_creation_race_loads_published_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("secret.key");
        let winner = [0x5a; KEY_LENGTH];
        fs::write(&path, winner).unwrap();

        // The file appeared after the existence check but before publishing.
        let key = KeyManager::new(&path, None).create().unwrap();
        assert_eq!(key.as_bytes(), &winner);
        assert_eq!(fs::read(&path).unwrap(), winner);
    }

    #[test]
    fn test_concurrent_first_use_agrees_on_one_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("secret.key");

        let keys: Vec<[u8; KEY_LENGTH]> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let path = &path;
                    scope.spawn(move || {
                        *KeyManager::new(path, None).load_or_create().unwrap().as_bytes()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let on_disk = fs::read(&path).unwrap();
        assert!(keys.iter().all(|key| key.as_slice() == on_disk.as_slice()));
    }

    #[test]
    fn test_missing_file_with_passphrase_persists_metadata_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("secret.key");
        let manager = KeyManager::new(&path, secret("correct horse battery"));

        let key = manager.load_or_create().unwrap();

        let on_disk = fs::read_to_string(&path).unwrap();
        assert!(!on_disk.contains("correct horse battery"));
        let meta: PassphraseKeyFile = serde_json::from_str(&on_disk).unwrap();
        assert_eq!(meta.mode, PASSPHRASE_KEY_MODE);
        assert_eq!(meta.kdf, PASSPHRASE_KEY_KDF);
        assert_eq!(meta.version, PASSPHRASE_KEY_VERSION);
        assert_eq!(meta.iterations, PBKDF2_ITERATIONS);
        assert_eq!(meta.salt_bytes().unwrap().len(), SALT_LENGTH);

        let reloaded = manager.load_or_create().unwrap();
        assert_eq!(reloaded.as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_existing_metadata_recomputes_key_from_stored_parameters() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("secret.key");
        let salt = b"0123456789abcdef";
        write_metadata(&path, &PassphraseKeyFile::new(salt, TEST_ITERATIONS));

        let key = KeyManager::new(&path, secret("hunter2hunter2"))
            .load_or_create()
            .unwrap();
        let expected = derive_key("hunter2hunter2", salt, TEST_ITERATIONS).unwrap();
        assert_eq!(key.as_bytes(), expected.as_bytes());

        let other = KeyManager::new(&path, secret("something-else"))
            .load_or_create()
            .unwrap();
        assert_ne!(other.as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_metadata_without_passphrase_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("secret.key");
        write_metadata(&path, &PassphraseKeyFile::new(b"0123456789abcdef", TEST_ITERATIONS));

        let result = KeyManager::new(&path, None).load_or_create();
        assert!(matches!(result, Err(StoreError::PassphraseRequired { .. })));
    }

    #[test]
    fn test_unsupported_mode_and_version_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("secret.key");

        let mut meta = PassphraseKeyFile::new(b"0123456789abcdef", TEST_ITERATIONS);
        meta.mode = "keyring".to_string();
        write_metadata(&path, &meta);
        let result = KeyManager::new(&path, secret("pw")).load_or_create();
        assert!(matches!(result, Err(StoreError::KeyFormat(_))));

        let mut meta = PassphraseKeyFile::new(b"0123456789abcdef", TEST_ITERATIONS);
        meta.version = 2;
        write_metadata(&path, &meta);
        let result = KeyManager::new(&path, secret("pw")).load_or_create();
        assert!(matches!(result, Err(StoreError::KeyFormat(_))));
    }

    #[test]
    fn test_garbage_key_file_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("secret.key");
        fs::write(&path, b"not a key").unwrap();

        let result = KeyManager::new(&path, None).load_or_create();
        assert!(matches!(result, Err(StoreError::KeyFormat(_))));
    }

    #[test]
    fn test_zero_iterations_fall_back_to_default() {
        let meta = PassphraseKeyFile::new(b"0123456789abcdef", 0);
        assert_eq!(meta.effective_iterations(), PBKDF2_ITERATIONS);
    }

    #[cfg(unix)]
    #[test]
    fn test_created_key_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("secret.key");
        KeyManager::new(&path, None).load_or_create().unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
