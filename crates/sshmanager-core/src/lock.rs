//! Single-host mutation lock.
//!
//! The lock is a sentinel file next to the connection document
//! (`<document>.lock`). Its existence means "held"; the `pid=` / `created=`
//! content is informational only. A sentinel whose modification time is
//! older than [`LockOptions::stale_after`] is assumed abandoned and removed.
//!
//! This is an advisory lock scoped to one host and filesystem. It does not
//! fence a holder whose lock was broken as stale.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use chrono::{SecondsFormat, Utc};
use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::fs::{ensure_private_dir, PRIVATE_FILE_MODE};

/// Default time to wait for a held lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Default polling interval while waiting.
pub const DEFAULT_LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Default age after which a sentinel is considered abandoned.
pub const DEFAULT_LOCK_STALE_AFTER: Duration = Duration::from_secs(120);

/// Timing parameters for lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    pub timeout: Duration,
    pub retry_interval: Duration,
    pub stale_after: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_LOCK_TIMEOUT,
            retry_interval: DEFAULT_LOCK_RETRY_INTERVAL,
            stale_after: DEFAULT_LOCK_STALE_AFTER,
        }
    }
}

impl LockOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }
}

/// Sentinel path guarding `document`.
pub fn lock_path_for(document: &Path) -> PathBuf {
    let mut name = OsString::from(document.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

/// A held mutation lock.
///
/// The sentinel is removed by [`MutationLock::release`] or, failing that,
/// when the guard is dropped, so every successful acquire is paired with
/// exactly one release even when the protected operation errors or panics.
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct MutationLock {
    path: PathBuf,
    released: bool,
}

impl MutationLock {
    /// Acquire the sentinel at `path`, waiting up to `options.timeout`.
    ///
    /// # Errors
    ///
    /// - `StoreError::LockTimeout` if a live sentinel is still present when
    ///   the timeout elapses
    /// - `StoreError::Io` for any other filesystem failure
    pub fn acquire(path: &Path, options: &LockOptions) -> Result<Self> {
        if let Some(parent) = path.parent() {
            ensure_private_dir(parent)?;
        }

        let started = Instant::now();
        let deadline = started + options.timeout;
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            match create_sentinel(path) {
                Ok(()) => {
                    debug!(path = %path.display(), attempts, "acquired mutation lock");
                    return Ok(Self {
                        path: path.to_path_buf(),
                        released: false,
                    });
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
                Err(err) => return Err(err.into()),
            }

            if is_stale(path, options.stale_after) {
                warn!(path = %path.display(), stale_after = ?options.stale_after, "breaking stale mutation lock");
                match fs::remove_file(path) {
                    Err(err) if err.kind() != io::ErrorKind::NotFound => {
                        return Err(err.into())
                    }
                    _ => continue,
                }
            }

            if Instant::now() >= deadline {
                return Err(StoreError::LockTimeout {
                    path: path.to_path_buf(),
                    waited: started.elapsed(),
                });
            }
            debug!(path = %path.display(), attempts, "mutation lock busy, retrying");
            thread::sleep(options.retry_interval);
        }
    }

    /// Path of the sentinel file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the sentinel.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        remove_sentinel(&self.path)?;
        debug!(path = %self.path.display(), "released mutation lock");
        Ok(())
    }
}

impl Drop for MutationLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = remove_sentinel(&self.path);
            debug!(path = %self.path.display(), "released mutation lock on drop");
        }
    }
}

fn create_sentinel(path: &Path) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(PRIVATE_FILE_MODE);
    }
    let mut file = options.open(path)?;
    // Content is informational; a failed write still leaves a valid lock.
    let _ = write!(
        file,
        "pid={}\ncreated={}\n",
        std::process::id(),
        Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
    );
    Ok(())
}

fn remove_sentinel(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

/// Time since the sentinel at `path` was last modified, if it exists.
pub fn sentinel_age(path: &Path) -> Option<Duration> {
    let modified = fs::metadata(path).and_then(|meta| meta.modified()).ok()?;
    SystemTime::now().duration_since(modified).ok()
}

fn is_stale(path: &Path, stale_after: Duration) -> bool {
    sentinel_age(path).is_some_and(|age| age > stale_after)
}
