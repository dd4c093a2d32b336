//! Status API models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Version response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Error body returned by every failing endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error kind, e.g. `environment_busy`
    pub kind: String,
    pub error: String,
}

/// Build metrics response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub total_builds: usize,
    pub successful_builds: usize,
    pub failed_builds: usize,
    pub unstable_builds: usize,
    pub success_rate: f64,
    pub average_duration_secs: i64,
    pub average_coverage: f64,
    pub test_pass_rate: f64,
}

/// Build record submitted by a CI runner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSubmission {
    /// Defaults to the time of submission
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub job_name: String,
    pub build_number: u64,
    pub duration_seconds: i64,
    pub status: String,
    #[serde(default)]
    pub tests_total: u32,
    #[serde(default)]
    pub tests_passed: u32,
    #[serde(default)]
    pub tests_failed: u32,
    #[serde(default)]
    pub coverage_percent: f64,
}

/// Accepted build record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildAccepted {
    pub record_id: u64,
}

/// One row of the recent builds view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSummaryResponse {
    pub job_name: String,
    pub build_number: u64,
    pub status: String,
    pub duration_seconds: i64,
    pub tests: String,
}

/// Recent builds response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentBuildsResponse {
    pub builds: Vec<BuildSummaryResponse>,
    pub total: usize,
}

/// Deployment request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployRequest {
    /// Directory holding the content to promote
    pub content_path: String,
    pub version: String,
}

/// Deployment or rollback outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentResponse {
    pub environment: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub status: String,
    pub action: String,
    pub backup_path: Option<String>,
    pub message: Option<String>,
}

/// Deployment history response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentListResponse {
    pub deployments: Vec<DeploymentResponse>,
    pub total: usize,
}

/// Retained backup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSummary {
    pub created_at: DateTime<Utc>,
    pub content_ref: String,
    pub version: Option<String>,
}

/// Environment status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentResponse {
    pub environment: String,
    pub state: String,
    pub location: String,
    pub version: Option<String>,
    pub deployed_at: Option<DateTime<Utc>>,
    pub digest: Option<String>,
    pub live: bool,
    pub backups: Vec<BackupSummary>,
}
