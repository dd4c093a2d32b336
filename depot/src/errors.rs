//! Error types for cidepot

use thiserror::Error;

/// Main error type for the depot
#[derive(Error, Debug)]
pub enum DepotError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Malformed record fields, rejected before any mutation
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid environment: {0}")]
    InvalidEnvironment(String),

    /// The new content failed verification and was not committed
    #[error("Health check failed for {environment}: {reason}")]
    HealthCheckFailed { environment: String, reason: String },

    #[error("No backup available for {0}")]
    NoBackupAvailable(String),

    /// Another deploy or rollback holds the environment
    #[error("Environment busy: {0}")]
    EnvironmentBusy(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Invalid state transition: {0}")]
    TransitionError(String),

    #[error("Notification error: {0}")]
    NotifyError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DepotError {
    /// Short machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            DepotError::IoError(_) | DepotError::StorageError(_) => "storage_error",
            DepotError::JsonError(_) => "json_error",
            DepotError::HttpError(_) => "http_error",
            DepotError::ValidationError(_) => "validation_error",
            DepotError::InvalidEnvironment(_) => "invalid_environment",
            DepotError::HealthCheckFailed { .. } => "health_check_failed",
            DepotError::NoBackupAvailable(_) => "no_backup_available",
            DepotError::EnvironmentBusy(_) => "environment_busy",
            DepotError::TransitionError(_) => "transition_error",
            DepotError::NotifyError(_) => "notify_error",
            DepotError::ServerError(_) => "server_error",
            DepotError::ShutdownError(_) => "shutdown_error",
            DepotError::ConfigError(_) => "config_error",
            DepotError::Internal(_) => "internal_error",
        }
    }
}

impl From<tokio::task::JoinError> for DepotError {
    fn from(err: tokio::task::JoinError) -> Self {
        DepotError::Internal(format!("task failed: {}", err))
    }
}
