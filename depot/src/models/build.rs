//! Build outcome models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DepotError;

/// Terminal status of a build, as reported by the CI runner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Success,
    Failure,
    Unstable,
    Unknown,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Success => "success",
            BuildStatus::Failure => "failure",
            BuildStatus::Unstable => "unstable",
            BuildStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BuildStatus {
    type Err = DepotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "success" => Ok(BuildStatus::Success),
            "failure" | "failed" => Ok(BuildStatus::Failure),
            "unstable" => Ok(BuildStatus::Unstable),
            "unknown" => Ok(BuildStatus::Unknown),
            _ => Err(DepotError::ValidationError(format!(
                "Invalid build status: {}",
                s
            ))),
        }
    }
}

/// One completed build attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRecord {
    /// When the build finished
    pub timestamp: DateTime<Utc>,

    pub job_name: String,

    /// Caller-supplied, increasing per job
    pub build_number: u64,

    /// Wall-clock duration; signed so that a bad runner value can be rejected
    pub duration_seconds: i64,

    pub status: BuildStatus,

    #[serde(default)]
    pub tests_total: u32,

    #[serde(default)]
    pub tests_passed: u32,

    #[serde(default)]
    pub tests_failed: u32,

    /// Line coverage, 0-100
    #[serde(default)]
    pub coverage_percent: f64,
}

impl BuildRecord {
    /// Create a record stamped with the current time and no test data
    pub fn new(
        job_name: impl Into<String>,
        build_number: u64,
        duration_seconds: i64,
        status: BuildStatus,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            job_name: job_name.into(),
            build_number,
            duration_seconds,
            status,
            tests_total: 0,
            tests_passed: 0,
            tests_failed: 0,
            coverage_percent: 0.0,
        }
    }

    /// Attach test report counts
    pub fn with_tests(mut self, total: u32, passed: u32, failed: u32) -> Self {
        self.tests_total = total;
        self.tests_passed = passed;
        self.tests_failed = failed;
        self
    }

    /// Attach coverage percentage
    pub fn with_coverage(mut self, coverage_percent: f64) -> Self {
        self.coverage_percent = coverage_percent;
        self
    }

    /// Reject malformed fields
    pub fn validate(&self) -> Result<(), DepotError> {
        if self.job_name.trim().is_empty() {
            return Err(DepotError::ValidationError(
                "job_name must not be empty".to_string(),
            ));
        }

        if self.duration_seconds < 0 {
            return Err(DepotError::ValidationError(format!(
                "duration_seconds must be non-negative, got {}",
                self.duration_seconds
            )));
        }

        let counted = u64::from(self.tests_passed) + u64::from(self.tests_failed);
        if counted > u64::from(self.tests_total) {
            return Err(DepotError::ValidationError(format!(
                "tests_passed ({}) + tests_failed ({}) exceeds tests_total ({})",
                self.tests_passed, self.tests_failed, self.tests_total
            )));
        }

        if !(0.0..=100.0).contains(&self.coverage_percent) {
            return Err(DepotError::ValidationError(format!(
                "coverage_percent must be within [0, 100], got {}",
                self.coverage_percent
            )));
        }

        Ok(())
    }
}
