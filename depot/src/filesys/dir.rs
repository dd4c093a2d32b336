//! Directory operations

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::errors::DepotError;
use crate::filesys::file::File;
use crate::utils::{generate_uuid, sha256_hash};

/// A directory wrapper with path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    /// Create a new directory reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the directory exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the directory (and parents)
    pub async fn create(&self) -> Result<(), DepotError> {
        fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    /// Delete the directory and all contents
    pub async fn delete(&self) -> Result<(), DepotError> {
        if self.exists().await {
            fs::remove_dir_all(&self.path).await?;
        }
        Ok(())
    }

    /// List files in the directory
    pub async fn list_files(&self) -> Result<Vec<PathBuf>, DepotError> {
        let mut files = Vec::new();
        let mut entries = fs::read_dir(&self.path).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }

        files.sort();
        Ok(files)
    }

    /// Get a file within this directory
    pub fn file(&self, name: &str) -> File {
        File::new(self.path.join(name))
    }

    /// Get a subdirectory
    pub fn subdir(&self, name: &str) -> Dir {
        Dir::new(self.path.join(name))
    }

    /// Recursively copy the contents of this directory into `target`.
    ///
    /// `target` is created if missing; existing files with the same name are
    /// overwritten, other files in `target` are left alone.
    pub async fn copy_into(&self, target: &Dir) -> Result<u64, DepotError> {
        let mut copied = 0u64;
        let mut pending = vec![(self.path.clone(), target.path.clone())];

        while let Some((src, dst)) = pending.pop() {
            fs::create_dir_all(&dst).await?;
            let mut entries = fs::read_dir(&src).await?;

            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                let dst_path = dst.join(entry.file_name());

                if file_type.is_dir() {
                    pending.push((entry.path(), dst_path));
                } else {
                    fs::copy(entry.path(), &dst_path).await?;
                    copied += 1;
                }
            }
        }

        Ok(copied)
    }

    /// SHA-256 over every file's relative path and contents.
    ///
    /// Two trees with the same files and bytes share a digest regardless of
    /// timestamps or directory iteration order.
    pub async fn digest(&self) -> Result<String, DepotError> {
        let mut files = Vec::new();
        let mut pending = vec![self.path.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_type().await?.is_dir() {
                    pending.push(entry.path());
                } else {
                    files.push(entry.path());
                }
            }
        }
        files.sort();

        let mut manifest = String::new();
        for path in files {
            let relative = path.strip_prefix(&self.path).unwrap_or(&path);
            let bytes = fs::read(&path).await?;
            manifest.push_str(&format!(
                "{}\0{}\n",
                relative.to_string_lossy(),
                sha256_hash(&bytes)
            ));
        }
        Ok(sha256_hash(manifest.as_bytes()))
    }

    /// Replace `target` with an exact copy of this directory.
    ///
    /// The copy is staged next to `target` and swapped in with renames, so a
    /// failed copy never leaves `target` half-written.
    pub async fn replace(&self, target: &Dir) -> Result<u64, DepotError> {
        let staging = target.sibling("staging");
        let retired = target.sibling("retired");

        staging.delete().await?;
        let copied = self.copy_into(&staging).await?;

        retired.delete().await?;
        if target.exists().await {
            fs::rename(&target.path, &retired.path).await?;
        }
        fs::rename(&staging.path, &target.path).await?;
        retired.delete().await?;

        Ok(copied)
    }

    fn sibling(&self, suffix: &str) -> Dir {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let sibling = format!(".{}.{}", name, suffix);
        match self.path.parent() {
            Some(parent) => Dir::new(parent.join(sibling)),
            None => Dir::new(PathBuf::from(sibling)),
        }
    }

    /// Create a temporary directory
    pub async fn create_temp_dir(prefix: &str) -> Result<Dir, DepotError> {
        let temp_dir = std::env::temp_dir().join(format!("{}-{}", prefix, generate_uuid()));
        fs::create_dir_all(&temp_dir).await?;
        Ok(Dir::new(temp_dir))
    }
}
