//! Content storage for environment slots and backups

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::errors::DepotError;
use crate::filesys::dir::Dir;
use crate::models::deployment::Environment;

/// Copy/snapshot/restore primitives over deployable content sets
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Copy the content at `location` into a new backup and return its reference
    async fn snapshot(&self, environment: Environment, location: &Path) -> Result<PathBuf, DepotError>;

    /// Make `content` the content at `location`, replacing what was there
    async fn write(&self, location: &Path, content: &Path) -> Result<(), DepotError>;

    /// Put the content of `backup` back at `location`
    async fn restore(&self, backup: &Path, location: &Path) -> Result<(), DepotError>;

    /// Remove all content at `location`
    async fn clear(&self, location: &Path) -> Result<(), DepotError>;

    /// Delete a backup that is no longer retained
    async fn discard(&self, backup: &Path) -> Result<(), DepotError>;

    /// Check whether `location` holds anything worth backing up
    async fn has_content(&self, location: &Path) -> bool;
}

/// Content store backed by directory trees on the local file system
#[derive(Debug, Clone)]
pub struct FsContentStore {
    backups_dir: Dir,
}

impl FsContentStore {
    pub fn new(backups_dir: Dir) -> Self {
        Self { backups_dir }
    }

    fn storage_err(action: &str, path: &Path, err: DepotError) -> DepotError {
        DepotError::StorageError(format!("{} {}: {}", action, path.display(), err))
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn snapshot(&self, environment: Environment, location: &Path) -> Result<PathBuf, DepotError> {
        let name = format!(
            "{}-{}",
            Utc::now().format("%Y%m%dT%H%M%S%.6fZ"),
            &crate::utils::generate_uuid()[..8]
        );
        let backup = self.backups_dir.subdir(environment.as_str()).subdir(&name);

        let copied = Dir::new(location)
            .copy_into(&backup)
            .await
            .map_err(|e| Self::storage_err("unable to snapshot", location, e))?;

        debug!("Snapshot of {} ({} files) stored at {}", environment, copied, backup.path().display());
        Ok(backup.path().to_path_buf())
    }

    async fn write(&self, location: &Path, content: &Path) -> Result<(), DepotError> {
        let source = Dir::new(content);
        if !source.exists().await {
            return Err(DepotError::StorageError(format!(
                "content directory {} does not exist",
                content.display()
            )));
        }

        source
            .replace(&Dir::new(location))
            .await
            .map_err(|e| Self::storage_err("unable to write", location, e))?;
        Ok(())
    }

    async fn restore(&self, backup: &Path, location: &Path) -> Result<(), DepotError> {
        let source = Dir::new(backup);
        if !source.exists().await {
            return Err(DepotError::StorageError(format!(
                "backup {} is missing",
                backup.display()
            )));
        }

        source
            .replace(&Dir::new(location))
            .await
            .map_err(|e| Self::storage_err("unable to restore", location, e))?;
        Ok(())
    }

    async fn clear(&self, location: &Path) -> Result<(), DepotError> {
        Dir::new(location)
            .delete()
            .await
            .map_err(|e| Self::storage_err("unable to clear", location, e))
    }

    async fn discard(&self, backup: &Path) -> Result<(), DepotError> {
        Dir::new(backup)
            .delete()
            .await
            .map_err(|e| Self::storage_err("unable to discard", backup, e))
    }

    async fn has_content(&self, location: &Path) -> bool {
        match tokio::fs::read_dir(location).await {
            Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
            Err(_) => false,
        }
    }
}
