//! Encrypted single-file connection store.
//!
//! On disk the document is `nonce ‖ AES-256-GCM(yaml)` at
//! [`StorePaths::connection_file`], replaced atomically on every write and
//! guarded by a sentinel lock beside it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zeroize::Zeroizing;

use super::traits::ConnectionStorage;
use crate::config::{StoreOptions, StorePaths};
use crate::crypto::{decrypt, encrypt, KeyManager, SecretKey};
use crate::error::{Result, StoreError};
use crate::fs::{is_file_empty, secure_delete, write_atomic, PRIVATE_FILE_MODE};
use crate::lock::{LockOptions, MutationLock};
use crate::model::ConnectionStoreDocument;

/// Connection document encrypted under a key from a [`KeyManager`].
#[derive(Debug)]
pub struct ConnectionStore {
    paths: StorePaths,
    keys: KeyManager,
    lock_options: LockOptions,
}

impl ConnectionStore {
    pub fn new(paths: StorePaths, options: StoreOptions) -> Self {
        let keys = KeyManager::new(paths.secret_key_file.clone(), options.passphrase);
        Self {
            paths,
            keys,
            lock_options: options.lock,
        }
    }

    /// Store at `paths` configured from the environment.
    pub fn open(paths: StorePaths) -> Self {
        Self::new(paths, StoreOptions::from_env())
    }

    /// Store at the default location configured from the environment.
    pub fn open_default() -> Result<Self> {
        Ok(Self::open(StorePaths::default_paths()?))
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    pub fn lock_options(&self) -> &LockOptions {
        &self.lock_options
    }

    /// Path of the mutation lock sentinel.
    pub fn lock_path(&self) -> PathBuf {
        self.paths.lock_file()
    }

    /// Write an empty document if the document file is missing or zero-length.
    ///
    /// Returns `true` if a document was written. Creates the key file as a
    /// side effect when it does not exist yet.
    pub fn initialize_if_empty(&self) -> Result<bool> {
        let lock = self.acquire_lock()?;
        if !is_file_empty(&self.paths.connection_file)? {
            lock.release()?;
            return Ok(false);
        }
        let key = self.keys.load_or_create()?;
        self.write_document(&mut ConnectionStoreDocument::new(), &key)?;
        lock.release()?;
        Ok(true)
    }

    pub fn key_manager(&self) -> &KeyManager {
        &self.keys
    }

    /// Decrypt and parse the document as it is on disk.
    ///
    /// Unlike `load`, this takes no lock, never creates the key file, and does
    /// not repair IDs, so the result may violate document invariants.
    pub fn inspect(&self) -> Result<ConnectionStoreDocument> {
        let key = self.keys.load_existing()?;
        self.read_document(&key)
    }

    /// Overwrite and remove the document and key files.
    ///
    /// Missing files are not an error.
    pub fn secure_delete(&self) -> Result<()> {
        let lock = self.acquire_lock()?;
        secure_delete(&self.paths.connection_file)?;
        secure_delete(&self.paths.secret_key_file)?;
        info!(path = %self.paths.connection_file.display(), "securely deleted connection store");
        lock.release()
    }

    fn acquire_lock(&self) -> Result<MutationLock> {
        MutationLock::acquire(&self.lock_path(), &self.lock_options)
    }

    /// Decrypt and parse the document. Missing or empty files are empty documents.
    fn read_document(&self, key: &SecretKey) -> Result<ConnectionStoreDocument> {
        let Some(blob) = read_if_exists(&self.paths.connection_file)? else {
            return Ok(ConnectionStoreDocument::new());
        };
        if blob.is_empty() {
            return Ok(ConnectionStoreDocument::new());
        }

        let plaintext = decrypt(&blob, key.as_bytes())?;
        let content = std::str::from_utf8(&plaintext).map_err(|_| {
            StoreError::Parse("connection document is not valid UTF-8".to_string())
        })?;
        ConnectionStoreDocument::parse(content)
    }

    /// Read with the lock held, persisting any ID repair immediately.
    fn load_locked(&self, key: &SecretKey) -> Result<ConnectionStoreDocument> {
        let mut document = self.read_document(key)?;
        if document.ensure_ids() {
            info!(
                path = %self.paths.connection_file.display(),
                records = document.len(),
                "repaired connection IDs, re-saving document"
            );
            self.write_document(&mut document, key)?;
        }
        Ok(document)
    }

    fn write_document(&self, document: &mut ConnectionStoreDocument, key: &SecretKey) -> Result<()> {
        document.normalize_version();
        document.ensure_ids();

        let content = Zeroizing::new(document.to_yaml()?);
        let blob = encrypt(content.as_bytes(), key.as_bytes())?;
        write_atomic(&self.paths.connection_file, &blob, PRIVATE_FILE_MODE)?;
        debug!(
            path = %self.paths.connection_file.display(),
            records = document.len(),
            "saved connection document"
        );
        Ok(())
    }
}

impl ConnectionStorage for ConnectionStore {
    fn load(&self) -> Result<ConnectionStoreDocument> {
        let key = self.keys.load_or_create()?;
        let mut document = self.read_document(&key)?;
        if !document.ensure_ids() {
            return Ok(document);
        }

        // Repair against the latest on-disk state, not the unlocked read.
        let lock = self.acquire_lock()?;
        let document = self.load_locked(&key)?;
        lock.release()?;
        Ok(document)
    }

    fn save(&self, mut document: ConnectionStoreDocument) -> Result<()> {
        let lock = self.acquire_lock()?;
        let key = self.keys.load_or_create()?;
        self.write_document(&mut document, &key)?;
        lock.release()
    }

    fn update<T, F>(&self, mutator: F) -> Result<T>
    where
        F: FnOnce(&mut ConnectionStoreDocument) -> Result<T>,
    {
        let lock = self.acquire_lock()?;
        let key = self.keys.load_or_create()?;
        // ID repair rides along with the mutation's write.
        let mut document = self.read_document(&key)?;
        document.ensure_ids();
        let value = mutator(&mut document)?;
        self.write_document(&mut document, &key)?;
        lock.release()?;
        Ok(value)
    }
}

fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConnectionRecord;
    use tempfile::{tempdir, TempDir};

    fn store_in(dir: &TempDir) -> ConnectionStore {
        ConnectionStore::new(StorePaths::in_dir(dir.path()), StoreOptions::default())
    }

    #[test]
    fn test_missing_document_loads_empty() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        let document = store.load().unwrap();
        assert!(document.is_empty());
        assert_eq!(document.version, "1.0");
        assert!(!store.paths().connection_file.exists());
        // The key is created on first use.
        assert_eq!(fs::read(&store.paths().secret_key_file).unwrap().len(), 32);
    }

    #[test]
    fn test_initialize_if_empty_writes_once() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        assert!(store.initialize_if_empty().unwrap());
        let first = fs::read(&store.paths().connection_file).unwrap();
        assert!(!first.is_empty());

        assert!(!store.initialize_if_empty().unwrap());
        assert_eq!(fs::read(&store.paths().connection_file).unwrap(), first);
        assert!(!store.lock_path().exists());
    }

    #[test]
    fn test_document_is_encrypted_at_rest() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        store
            .update(|doc| doc.add_connection(ConnectionRecord::new("deploy", "secret-host.example")))
            .unwrap();

        let on_disk = fs::read(&store.paths().connection_file).unwrap();
        let needle = b"secret-host.example";
        assert!(!on_disk.windows(needle.len()).any(|w| w == needle));
    }

    #[test]
    fn test_update_returns_mutator_value() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        let id = store
            .update(|doc| doc.add_connection(ConnectionRecord::new("u", "h").with_alias("web")))
            .unwrap();

        let document = store.load().unwrap();
        assert_eq!(document.get_connection_by_alias("WEB").unwrap().id, id);
    }

    #[test]
    fn test_save_normalizes_version_and_ids() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        let mut document = ConnectionStoreDocument::from_records(vec![
            ConnectionRecord::new("a", "a"),
            ConnectionRecord::new("b", "b"),
        ]);
        document.version = " ".to_string();
        store.save(document).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.version, "1.0");
        assert!(loaded.connections.iter().all(|r| r.id.len() == 32));
        assert_ne!(loaded.connections[0].id, loaded.connections[1].id);
    }

    #[test]
    fn test_failed_update_does_not_persist_id_repair() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        let key = store.key_manager().load_or_create().unwrap();
        let blob = encrypt(b"- username: u\n  host: h\n", key.as_bytes()).unwrap();
        fs::write(&store.paths().connection_file, &blob).unwrap();

        let err = store
            .update(|_| -> Result<()> { Err(StoreError::Validation("rejected".to_string())) })
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert_eq!(fs::read(&store.paths().connection_file).unwrap(), blob);
        assert!(!store.lock_path().exists());

        // A successful update commits the repair together with the change.
        let id = store
            .update(|doc| {
                assert!(!doc.connections[0].id.is_empty());
                doc.add_connection(ConnectionRecord::new("u", "h2"))
            })
            .unwrap();
        let loaded = store.inspect().unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.connections.iter().all(|r| !r.id.is_empty()));
        assert!(loaded.get_connection_by_id(&id).is_some());
    }

    #[test]
    fn test_secure_delete_removes_files() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        store.initialize_if_empty().unwrap();

        store.secure_delete().unwrap();
        assert!(!store.paths().connection_file.exists());
        assert!(!store.paths().secret_key_file.exists());
        assert!(!store.lock_path().exists());
    }
}
