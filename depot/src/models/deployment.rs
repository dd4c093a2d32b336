//! Deployment models

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DepotError;

/// A named deployment destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Staging,
    Production,
    /// Physical blue-green slot
    Blue,
    /// Physical blue-green slot
    Green,
}

impl Environment {
    pub const ALL: [Environment; 4] = [
        Environment::Staging,
        Environment::Production,
        Environment::Blue,
        Environment::Green,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Staging => "staging",
            Environment::Production => "production",
            Environment::Blue => "blue",
            Environment::Green => "green",
        }
    }

    /// The other blue-green slot, if this is one
    pub fn counterpart(&self) -> Option<Environment> {
        match self {
            Environment::Blue => Some(Environment::Green),
            Environment::Green => Some(Environment::Blue),
            _ => None,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Environment {
    type Err = DepotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "staging" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            "blue" => Ok(Environment::Blue),
            "green" => Ok(Environment::Green),
            _ => Err(DepotError::InvalidEnvironment(s.to_string())),
        }
    }
}

/// Outcome of a promotion attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Success,
    Failed,
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeploymentStatus::Success => f.write_str("success"),
            DeploymentStatus::Failed => f.write_str("failed"),
        }
    }
}

/// What produced a deployment record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentAction {
    Deploy,
    BlueGreen,
    Rollback,
}

impl std::fmt::Display for DeploymentAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeploymentAction::Deploy => f.write_str("deploy"),
            DeploymentAction::BlueGreen => f.write_str("blue_green"),
            DeploymentAction::Rollback => f.write_str("rollback"),
        }
    }
}

/// One promotion attempt to an environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub environment: Environment,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub status: DeploymentStatus,
    pub action: DeploymentAction,

    /// Snapshot taken before the overwrite, if there was content to back up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<PathBuf>,

    /// Failure detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl DeploymentRecord {
    pub fn is_success(&self) -> bool {
        self.status == DeploymentStatus::Success
    }
}

/// A timestamped snapshot of an environment's prior content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
    pub environment: Environment,
    pub created_at: DateTime<Utc>,

    /// Location of the snapshot in content storage
    pub content_ref: PathBuf,

    /// Version that was active when the snapshot was taken
    #[serde(default)]
    pub version: Option<String>,

    /// Insertion order within the environment, breaks `created_at` ties
    pub seq: u64,
}

/// Content currently served by an environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveContent {
    pub version: String,
    pub deployed_at: DateTime<Utc>,

    /// Tree digest of the deployed files, see `Dir::digest`
    #[serde(default)]
    pub digest: Option<String>,
}
