//! Advisory flock(2) guarding the file store's own read-modify-write.
//!
//! This serialises writes to the store file only. It does not coordinate
//! ledger updates between keyring instances (last full ledger write wins).

use crate::error::{KeyringError, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

/// Held for the duration of one store mutation; released on drop.
pub struct StoreLock {
    _file: File,
}

fn lock_error(action: &str, path: &Path, e: io::Error) -> KeyringError {
    KeyringError::Backend(format!("{} {}: {}", action, path.display(), e))
}

fn open_lock_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
        .map_err(|e| lock_error("open lock", path, e))
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl StoreLock {
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = open_lock_file(path)?;
        file.lock_exclusive()
            .map_err(|e| lock_error("lock", path, e))?;
        Ok(Self { _file: file })
    }

    /// Non-blocking variant; `Ok(None)` when another handle holds the lock.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
        let file = open_lock_file(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { _file: file })),
            Err(e) if is_contended(&e) => Ok(None),
            Err(e) => Err(lock_error("lock", path, e)),
        }
    }
}
