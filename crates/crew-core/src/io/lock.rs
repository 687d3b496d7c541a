//! Mutual exclusion for shared state files.
//!
//! Two lock flavors live here, both released automatically on drop:
//!
//! - [`FileLock`] wraps an advisory `fs2` lock (flock on Unix, LockFileEx on
//!   Windows). Used for the task board, where every holder is a cooperating
//!   process that goes through this module.
//! - [`SentinelLock`] is an exclusive-create lock file. Used for inboxes,
//!   where the contract is that the mere existence of `<inbox>.lock` blocks
//!   other writers and drainers, including external tools that only know how
//!   to create a file.

use crate::io::error::StoreError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default retry count for blocking acquisition.
pub const DEFAULT_LOCK_RETRIES: u32 = 5;

fn backoff(attempt: u32) {
    // 50ms, 100ms, 200ms, 400ms, 800ms
    let wait_ms = 50u64 * (1 << attempt);
    std::thread::sleep(Duration::from_millis(wait_ms));
}

/// Advisory lock guard over a sibling lock file; unlocks on drop.
pub struct FileLock {
    file: File,
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Fully qualified to avoid the unstable-name collision warning.
        let _ = FileExt::unlock(&self.file);
    }
}

impl FileLock {
    /// Acquire an exclusive advisory lock with exponential backoff.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::LockTimeout` when the lock is still held after
    /// all retries, or `StoreError::Io` for any other failure.
    pub fn acquire(path: &Path, max_retries: u32) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| StoreError::io(path, e))?;

        for attempt in 0..=max_retries {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(FileLock { file }),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if attempt < max_retries {
                        backoff(attempt);
                    }
                }
                Err(e) => return Err(StoreError::io(path, e)),
            }
        }

        Err(StoreError::LockTimeout {
            path: path.to_path_buf(),
            retries: max_retries,
        })
    }
}

/// Exclusive-create lock file guard; the file is removed on drop.
///
/// Holding the guard means this process created `path` with `O_EXCL`
/// semantics. Anyone else who tries to create it fails until release.
pub struct SentinelLock {
    path: PathBuf,
}

impl Drop for SentinelLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

impl SentinelLock {
    /// Single non-blocking acquisition attempt.
    ///
    /// Returns `Ok(None)` when another holder currently owns the lock.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` for failures other than contention.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>, StoreError> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(_) => Ok(Some(SentinelLock {
                path: path.to_path_buf(),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    /// Acquire with exponential backoff.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::LockTimeout` when still contended after all
    /// retries.
    pub fn acquire(path: &Path, max_retries: u32) -> Result<Self, StoreError> {
        for attempt in 0..=max_retries {
            if let Some(lock) = Self::try_acquire(path)? {
                return Ok(lock);
            }
            if attempt < max_retries {
                backoff(attempt);
            }
        }
        Err(StoreError::LockTimeout {
            path: path.to_path_buf(),
            retries: max_retries,
        })
    }
}

/// Lock file path for a shared state file: the same name with `.lock`
/// appended (`inbox.alice.jsonl` -> `inbox.alice.jsonl.lock`).
pub fn sibling_lock_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".lock");
    PathBuf::from(os)
}
