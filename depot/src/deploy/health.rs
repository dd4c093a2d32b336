//! Health checks run against freshly deployed content

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::models::deployment::Environment;

/// Outcome of a health check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// Oracle that decides whether deployed content works
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check(&self, environment: Environment, location: &Path) -> HealthStatus;
}

/// Run a health check, treating a timeout as unhealthy
pub async fn check_with_timeout(
    check: &dyn HealthCheck,
    environment: Environment,
    location: &Path,
    timeout: Duration,
) -> HealthStatus {
    match tokio::time::timeout(timeout, check.check(environment, location)).await {
        Ok(status) => status,
        Err(_) => {
            warn!("Health check for {} timed out after {:?}", environment, timeout);
            HealthStatus::Unhealthy(format!("timed out after {:?}", timeout))
        }
    }
}

/// Runs a command inside the deployed content directory; exit code 0 is healthy.
///
/// The environment name is exported as `DEPOT_ENVIRONMENT`.
#[derive(Debug, Clone)]
pub struct CommandHealthCheck {
    program: String,
    args: Vec<String>,
}

impl CommandHealthCheck {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl HealthCheck for CommandHealthCheck {
    async fn check(&self, environment: Environment, location: &Path) -> HealthStatus {
        debug!("Running health check {} {:?} in {}", self.program, self.args, location.display());

        let output = Command::new(&self.program)
            .args(&self.args)
            .current_dir(location)
            .env("DEPOT_ENVIRONMENT", environment.as_str())
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => HealthStatus::Healthy,
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                let reason = if stderr.is_empty() {
                    format!("health command exited with {}", output.status)
                } else {
                    format!("health command exited with {}: {}", output.status, stderr)
                };
                HealthStatus::Unhealthy(reason)
            }
            Err(e) => HealthStatus::Unhealthy(format!("unable to run {}: {}", self.program, e)),
        }
    }
}

/// Healthy as long as the deployed directory holds the named file
#[derive(Debug, Clone)]
pub struct MarkerFileHealthCheck {
    marker: PathBuf,
}

impl MarkerFileHealthCheck {
    pub fn new(marker: impl Into<PathBuf>) -> Self {
        Self {
            marker: marker.into(),
        }
    }
}

#[async_trait]
impl HealthCheck for MarkerFileHealthCheck {
    async fn check(&self, _environment: Environment, location: &Path) -> HealthStatus {
        match tokio::fs::metadata(location.join(&self.marker)).await {
            Ok(_) => HealthStatus::Healthy,
            Err(_) => HealthStatus::Unhealthy(format!("{} is missing", self.marker.display())),
        }
    }
}

/// Healthy when the deployed directory holds at least one entry
#[derive(Debug, Default, Clone)]
pub struct NonEmptyHealthCheck;

#[async_trait]
impl HealthCheck for NonEmptyHealthCheck {
    async fn check(&self, _environment: Environment, location: &Path) -> HealthStatus {
        match tokio::fs::read_dir(location).await {
            Ok(mut entries) => match entries.next_entry().await {
                Ok(Some(_)) => HealthStatus::Healthy,
                Ok(None) => HealthStatus::Unhealthy("deployed directory is empty".to_string()),
                Err(e) => HealthStatus::Unhealthy(e.to_string()),
            },
            Err(e) => HealthStatus::Unhealthy(format!("unable to read {}: {}", location.display(), e)),
        }
    }
}
