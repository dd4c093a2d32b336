//! Settings file management

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::deploy::backups::DEFAULT_BACKUP_RETENTION;
use crate::deploy::manager::DeploySettings;
use crate::errors::DepotError;
use crate::filesys::file::File;
use crate::logs::LogLevel;
use crate::models::deployment::Environment;
use crate::storage::layout::StorageLayout;

/// Depot settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON logs on stdout
    #[serde(default)]
    pub json_logs: bool,

    /// Write rolling log files under the logs directory
    #[serde(default = "default_true")]
    pub log_to_file: bool,

    /// Content location per environment; relative paths are resolved against
    /// the base directory. Empty means every environment under `slots/`.
    #[serde(default)]
    pub environments: HashMap<Environment, PathBuf>,

    /// Backups kept per environment
    #[serde(default = "default_backup_retention")]
    pub backup_retention: usize,

    /// Health check configuration
    #[serde(default)]
    pub health_check: HealthCheckSettings,

    /// Notification channels
    #[serde(default)]
    pub notifier: NotifierSettings,

    /// Enable the status API
    #[serde(default = "default_true")]
    pub enable_server: bool,

    /// Status API configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Metrics reporter configuration
    #[serde(default)]
    pub reporter: ReporterSettings,
}

fn default_true() -> bool {
    true
}

fn default_backup_retention() -> usize {
    DEFAULT_BACKUP_RETENTION
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            json_logs: false,
            log_to_file: true,
            environments: HashMap::new(),
            backup_retention: DEFAULT_BACKUP_RETENTION,
            health_check: HealthCheckSettings::default(),
            notifier: NotifierSettings::default(),
            enable_server: true,
            server: ServerSettings::default(),
            reporter: ReporterSettings::default(),
        }
    }
}

impl Settings {
    /// Read settings, falling back to defaults when the file is absent
    pub async fn load(file: &File) -> Result<Self, DepotError> {
        if !file.exists().await {
            return Ok(Self::default());
        }
        let settings = file.read_json::<Settings>().await.map_err(|e| {
            DepotError::ConfigError(format!(
                "unable to read {}: {}",
                file.path().display(),
                e
            ))
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values no deploy or report could work with
    pub fn validate(&self) -> Result<(), DepotError> {
        let invalid = |reason: &str| Err(DepotError::ConfigError(reason.to_string()));

        if self.backup_retention == 0 {
            return invalid("backup_retention must be at least 1");
        }
        if self.health_check.timeout_secs == 0 {
            return invalid("health_check.timeout_secs must be at least 1");
        }
        if matches!(&self.health_check.command, Some(command) if command.trim().is_empty()) {
            return invalid("health_check.command must not be empty");
        }
        if self.notifier.webhook_timeout_secs == 0 {
            return invalid("notifier.webhook_timeout_secs must be at least 1");
        }
        if self.reporter.interval_secs == 0 {
            return invalid("reporter.interval_secs must be at least 1");
        }
        if self.reporter.window == 0 {
            return invalid("reporter.window must be at least 1");
        }
        Ok(())
    }

    /// Resolved content location of every recognized environment
    pub fn environment_locations(&self, layout: &StorageLayout) -> HashMap<Environment, PathBuf> {
        if self.environments.is_empty() {
            return Environment::ALL
                .iter()
                .map(|env| (*env, layout.slot_dir(*env).path().to_path_buf()))
                .collect();
        }

        self.environments
            .iter()
            .map(|(env, path)| {
                let path = if path.is_relative() {
                    layout.base_dir.join(path)
                } else {
                    path.clone()
                };
                (*env, path)
            })
            .collect()
    }

    pub fn deploy_settings(&self) -> DeploySettings {
        DeploySettings {
            health_check_timeout: Duration::from_secs(self.health_check.timeout_secs),
            backup_retention: self.backup_retention,
        }
    }
}

/// Health check settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckSettings {
    /// Command run inside the deployed directory; exit code 0 is healthy
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    /// File that must exist in the deployed directory, used when no command is set
    #[serde(default)]
    pub marker_file: Option<String>,

    #[serde(default = "default_health_timeout")]
    pub timeout_secs: u64,
}

fn default_health_timeout() -> u64 {
    10
}

impl Default for HealthCheckSettings {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            marker_file: None,
            timeout_secs: default_health_timeout(),
        }
    }
}

/// Notification channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierSettings {
    #[serde(default = "default_true")]
    pub console: bool,

    /// Append notifications to `notifications.jsonl`
    #[serde(default)]
    pub log_file: bool,

    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default = "default_webhook_timeout")]
    pub webhook_timeout_secs: u64,
}

fn default_webhook_timeout() -> u64 {
    5
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            console: true,
            log_file: false,
            webhook_url: None,
            webhook_timeout_secs: default_webhook_timeout(),
        }
    }
}

/// Status API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8088
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Metrics reporter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReporterSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_report_interval")]
    pub interval_secs: u64,

    /// Number of recent builds included in the report
    #[serde(default = "default_report_window")]
    pub window: usize,
}

fn default_report_interval() -> u64 {
    60
}

fn default_report_window() -> usize {
    10
}

impl Default for ReporterSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_report_interval(),
            window: default_report_window(),
        }
    }
}
