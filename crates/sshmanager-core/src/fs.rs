//! Filesystem utilities for atomic operations.
//!
//! Every persisted file in the store goes through [`write_atomic`]: the new
//! bytes are staged in a temporary file next to the destination, synced, and
//! renamed over it. Readers observe either the complete previous content or
//! the complete new content.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Permission bits for directories created by the store.
pub const PRIVATE_DIR_MODE: u32 = 0o700;

/// Permission bits for files created by the store.
pub const PRIVATE_FILE_MODE: u32 = 0o600;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Rename `temp_path` over `destination`.
///
/// On Unix `rename(2)` replaces the destination atomically, so a failure
/// leaves it untouched. On Windows, where rename refuses an existing target,
/// the destination is removed and the rename retried.
///
/// The temp file is removed if the rename ultimately fails.
pub fn rename_with_fallback(temp_path: &Path, destination: &Path) -> io::Result<()> {
    let result = fs::rename(temp_path, destination);
    #[cfg(windows)]
    let result = result.or_else(|initial_err| {
        let _ = fs::remove_file(destination);
        fs::rename(temp_path, destination).map_err(|retry_err| {
            io::Error::new(
                retry_err.kind(),
                format!(
                    "Atomic rename failed (initial: {}, retry: {})",
                    initial_err, retry_err
                ),
            )
        })
    });
    result.map_err(|err| {
        let _ = fs::remove_file(temp_path);
        err
    })
}

/// Create `dir` and any missing parents with owner-only permissions.
pub fn ensure_private_dir(dir: &Path) -> io::Result<()> {
    if dir.as_os_str().is_empty() || dir.is_dir() {
        return Ok(());
    }
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(PRIVATE_DIR_MODE);
    }
    builder.create(dir)
}

/// A fully written temporary file waiting to replace its destination.
///
/// Dropping a `StagedFile` without calling [`StagedFile::commit`] removes the
/// temporary file and leaves the destination untouched.
#[derive(Debug)]
pub struct StagedFile {
    temp_path: PathBuf,
    destination: PathBuf,
    committed: bool,
}

impl StagedFile {
    /// Write `data` to a fresh temporary file beside `destination` and sync it.
    pub fn stage(destination: &Path, data: &[u8], mode: u32) -> io::Result<Self> {
        let parent = parent_dir(destination)?;
        ensure_private_dir(&parent)?;

        let temp_path = parent.join(temp_file_name(destination)?);
        let mut file = open_new(&temp_path, mode)?;
        let staged = Self {
            temp_path,
            destination: destination.to_path_buf(),
            committed: false,
        };

        file.write_all(data)?;
        file.flush()?;
        file.sync_all()?;
        Ok(staged)
    }

    /// Path of the staged temporary file.
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Rename the staged file over its destination.
    pub fn commit(mut self) -> io::Result<()> {
        rename_with_fallback(&self.temp_path, &self.destination)?;
        self.committed = true;
        sync_parent_dir(&self.destination);
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}

/// Replace `path` with `data` so that the destination is never partially written.
///
/// The parent directory is created with mode `0700` when missing and the
/// resulting file carries `mode` on Unix.
pub fn write_atomic(path: &Path, data: &[u8], mode: u32) -> io::Result<()> {
    StagedFile::stage(path, data, mode)?.commit()
}

/// Publish `data` at `path` only if nothing exists there yet.
///
/// Returns `Ok(false)` when another writer created `path` first; the existing
/// file is left untouched. The content is never observable half-written.
pub fn write_new_atomic(path: &Path, data: &[u8], mode: u32) -> io::Result<bool> {
    let staged = StagedFile::stage(path, data, mode)?;
    match fs::hard_link(staged.temp_path(), path) {
        Ok(()) => {
            sync_parent_dir(path);
            Ok(true)
        }
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(err) => Err(err),
    }
}

/// Check whether `path` is missing or zero-length.
pub fn is_file_empty(path: &Path) -> io::Result<bool> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.len() == 0),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(true),
        Err(err) => Err(err),
    }
}

/// Overwrite `path` with random bytes, then remove it.
///
/// A missing file is not an error. The overwrite is best-effort: journaling
/// and copy-on-write filesystems may keep older blocks around.
pub fn secure_delete(path: &Path) -> io::Result<()> {
    let mut file = match OpenOptions::new().write(true).open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };

    let mut remaining = file.metadata()?.len();
    let mut chunk = [0u8; 4096];
    while remaining > 0 {
        let len = remaining.min(chunk.len() as u64) as usize;
        getrandom::getrandom(&mut chunk[..len])
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        file.write_all(&chunk[..len])?;
        remaining -= len as u64;
    }
    file.sync_all()?;
    drop(file);

    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

fn parent_dir(path: &Path) -> io::Result<PathBuf> {
    match path.parent() {
        Some(parent) if parent.as_os_str().is_empty() => Ok(PathBuf::from(".")),
        Some(parent) => Ok(parent.to_path_buf()),
        None => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Invalid file path: {}", path.display()),
        )),
    }
}

fn temp_file_name(destination: &Path) -> io::Result<String> {
    let filename = destination
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Invalid filename: {}", destination.display()),
            )
        })?;
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("System time error: {}", e)))?
        .as_nanos();
    let counter = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    Ok(format!(
        ".{}.tmp-{}-{}-{}",
        filename,
        std::process::id(),
        nanos,
        counter
    ))
}

fn open_new(path: &Path, mode: u32) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    options.open(path)
}

fn sync_parent_dir(path: &Path) {
    #[cfg(unix)]
    if let Ok(parent) = parent_dir(path) {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}
