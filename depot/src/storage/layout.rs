//! Storage layout configuration

use std::path::PathBuf;

use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::models::deployment::Environment;

/// On-disk layout of the depot
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Get the ledger directory
    pub fn ledger_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("ledger"))
    }

    /// Build outcome ledger
    pub fn builds_ledger_file(&self) -> File {
        self.ledger_dir().file("builds.jsonl")
    }

    /// Deployment outcome ledger
    pub fn deployments_ledger_file(&self) -> File {
        self.ledger_dir().file("deployments.jsonl")
    }

    /// Get the backups directory
    pub fn backups_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("backups"))
    }

    /// Get the directory holding default environment slots
    pub fn slots_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("slots"))
    }

    /// Default content location of an environment
    pub fn slot_dir(&self, environment: Environment) -> Dir {
        self.slots_dir().subdir(environment.as_str())
    }

    /// Get the slot state directory
    pub fn state_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("state"))
    }

    /// Latest metrics report
    pub fn metrics_file(&self) -> File {
        File::new(self.base_dir.join("metrics.json"))
    }

    /// Notifications written by the log file channel
    pub fn notifications_file(&self) -> File {
        File::new(self.base_dir.join("notifications.jsonl"))
    }

    /// Get the logs directory
    pub fn logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("logs"))
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), crate::errors::DepotError> {
        self.ledger_dir().create().await?;
        self.backups_dir().create().await?;
        self.slots_dir().create().await?;
        self.state_dir().create().await?;
        self.logs_dir().create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        // Use /var/lib/cidepot on Linux, or user home directory on other platforms
        #[cfg(target_os = "linux")]
        let base_dir = PathBuf::from("/var/lib/cidepot");

        #[cfg(not(target_os = "linux"))]
        let base_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cidepot");

        Self::new(base_dir)
    }
}

#[cfg(not(target_os = "linux"))]
mod dirs {
    use std::path::PathBuf;

    pub fn home_dir() -> Option<PathBuf> {
        std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
    }
}
