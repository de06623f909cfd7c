//! Scoped cross-process lock files
//!
//! Registry instances in different processes coordinate loads and cache
//! writes through an exclusive lock on a file in the config or cache
//! directory. Acquisition blocks the calling thread with a bounded wait;
//! the lock is released when the guard drops, on every exit path. The file
//! itself stays in place so every contender, including waiters already
//! holding a descriptor, keeps locking the same inode.

use crate::error::{RegistryError, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::warn;

/// Bounded wait before acquisition fails with a timeout
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Exclusive lock on a file, held until the guard drops
pub struct LockFile {
    file: File,
    path: PathBuf,
}

impl LockFile {
    /// Acquire the lock at `path`, waiting up to [`LOCK_TIMEOUT`]
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        Self::acquire_with_timeout(path, LOCK_TIMEOUT)
    }

    pub fn acquire_with_timeout(path: impl AsRef<Path>, timeout: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let start = Instant::now();
        let mut reported_wait = false;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(LockFile { file, path }),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if start.elapsed() >= timeout {
                        return Err(RegistryError::LockTimeout {
                            path,
                            waited_secs: timeout.as_secs(),
                        });
                    }
                    if !reported_wait {
                        warn!("Waiting for lock file {} to be released...", path.display());
                        reported_wait = true;
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        // Never unlink: a waiter polling on the old inode and a fresh
        // acquirer opening the path must contend on the same file.
        let _ = self.file.unlock();
    }
}
