//! Advisory file locks shared between processes

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fd_lock::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::fs;

use crate::errors::DepotError;

/// Held exclusive lock
pub type ExclusiveGuard<'a> = RwLockWriteGuard<'a, std::fs::File>;

/// Held shared lock
pub type SharedGuard<'a> = RwLockReadGuard<'a, std::fs::File>;

/// An advisory lock on a file.
///
/// Every handle opened on the same path contends for the lock, including
/// handles in the same process. The lock is released when the guard drops.
pub struct FileLock {
    path: PathBuf,
    lock: RwLock<std::fs::File>,
}

impl FileLock {
    /// Open the file at `path` for locking, creating it if needed
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, DepotError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .await
            .map_err(|e| DepotError::StorageError(format!("unable to open {}: {}", path.display(), e)))?;

        Ok(Self {
            path,
            lock: RwLock::new(file.into_std().await),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the exclusive lock if nobody holds it
    pub fn try_hold(&mut self) -> Result<Option<ExclusiveGuard<'_>>, DepotError> {
        let Self { path, lock } = self;
        match lock.try_write() {
            Ok(guard) => Ok(Some(guard)),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(lock_err(path, e)),
        }
    }

    /// Wait for the exclusive lock.
    ///
    /// Blocks the calling thread; call it from `spawn_blocking`.
    pub fn hold(&mut self) -> Result<ExclusiveGuard<'_>, DepotError> {
        let Self { path, lock } = self;
        lock.write().map_err(|e| lock_err(path, e))
    }

    /// Wait for a shared lock. Blocks like [`FileLock::hold`].
    pub fn hold_shared(&self) -> Result<SharedGuard<'_>, DepotError> {
        self.lock.read().map_err(|e| lock_err(&self.path, e))
    }
}

fn lock_err(path: &Path, err: std::io::Error) -> DepotError {
    DepotError::StorageError(format!("unable to lock {}: {}", path.display(), err))
}

/// Exclusive hold on `lock`, or `EnvironmentBusy` naming `owner`
pub fn hold_or_busy<'a>(lock: &'a mut FileLock, owner: &str) -> Result<ExclusiveGuard<'a>, DepotError> {
    lock.try_hold()?
        .ok_or_else(|| DepotError::EnvironmentBusy(owner.to_string()))
}
