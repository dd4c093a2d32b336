//! Build statistics computed over the build ledger

use std::num::NonZeroUsize;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DepotError;
use crate::ledger::BuildLedger;
use crate::models::build::{BuildRecord, BuildStatus};

/// Projection of one build for recent-history views
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSummary {
    pub job_name: String,
    pub build_number: u64,
    pub status: BuildStatus,
    pub duration_seconds: i64,
    pub tests_passed: u32,
    pub tests_total: u32,
}

impl BuildSummary {
    /// Passed/total as shown in build reports, e.g. `9/10`
    pub fn tests_ratio(&self) -> String {
        format!("{}/{}", self.tests_passed, self.tests_total)
    }
}

impl From<&BuildRecord> for BuildSummary {
    fn from(record: &BuildRecord) -> Self {
        Self {
            job_name: record.job_name.clone(),
            build_number: record.build_number,
            status: record.status,
            duration_seconds: record.duration_seconds,
            tests_passed: record.tests_passed,
            tests_total: record.tests_total,
        }
    }
}

/// Full metrics report, as written to `metrics.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsReport {
    pub generated_at: DateTime<Utc>,
    pub total_builds: usize,
    pub successful_builds: usize,
    pub failed_builds: usize,
    pub unstable_builds: usize,
    pub unknown_builds: usize,

    /// Percentage, 0-100
    pub success_rate: f64,
    pub average_duration_secs: i64,

    /// Mean coverage over all builds, 0-100
    pub average_coverage: f64,

    /// Passed tests over total tests across all builds, 0-100
    pub test_pass_rate: f64,

    pub recent: Vec<BuildSummary>,
}

/// Read-side statistics over a build ledger.
///
/// Every call recomputes from a ledger snapshot.
#[derive(Clone)]
pub struct MetricsAggregator {
    builds: Arc<BuildLedger>,
}

impl MetricsAggregator {
    pub fn new(builds: Arc<BuildLedger>) -> Self {
        Self { builds }
    }

    /// Pick up builds recorded by other processes since the last look
    pub async fn refresh(&self) -> Result<usize, DepotError> {
        self.builds.sync().await
    }

    /// Percentage of successful builds; 0 when there are none
    pub fn success_rate(&self) -> f64 {
        let snapshot = self.builds.all();
        let successes = snapshot
            .iter()
            .filter(|r| r.status == BuildStatus::Success)
            .count();
        percentage(successes as u64, snapshot.len() as u64)
    }

    /// Mean build duration in whole seconds, truncated; 0 when there are none
    pub fn average_duration(&self) -> i64 {
        let snapshot = self.builds.all();
        mean_duration(snapshot.iter(), snapshot.len())
    }

    /// Summaries of the last `n` builds, oldest first
    pub fn recent_summary(&self, n: NonZeroUsize) -> Vec<BuildSummary> {
        self.builds
            .list_recent(n)
            .iter()
            .map(BuildSummary::from)
            .collect()
    }

    /// Compute every statistic from a single snapshot
    pub fn report(&self, window: NonZeroUsize) -> MetricsReport {
        let snapshot = self.builds.all();
        let total = snapshot.len();

        let count = |status: BuildStatus| snapshot.iter().filter(|r| r.status == status).count();
        let successful_builds = count(BuildStatus::Success);

        let coverage_sum: f64 = snapshot.iter().map(|r| r.coverage_percent).sum();
        let (passed, tests) = snapshot.iter().fold((0u64, 0u64), |(passed, tests), r| {
            (passed + u64::from(r.tests_passed), tests + u64::from(r.tests_total))
        });

        let start = total.saturating_sub(window.get());
        let recent = snapshot
            .iter()
            .skip(start)
            .map(BuildSummary::from)
            .collect();

        MetricsReport {
            generated_at: Utc::now(),
            total_builds: total,
            successful_builds,
            failed_builds: count(BuildStatus::Failure),
            unstable_builds: count(BuildStatus::Unstable),
            unknown_builds: count(BuildStatus::Unknown),
            success_rate: percentage(successful_builds as u64, total as u64),
            average_duration_secs: mean_duration(snapshot.iter(), total),
            average_coverage: if total > 0 {
                coverage_sum / total as f64
            } else {
                0.0
            },
            test_pass_rate: percentage(passed, tests),
            recent,
        }
    }
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    100.0 * part as f64 / whole as f64
}

fn mean_duration<'a>(records: impl Iterator<Item = &'a BuildRecord>, count: usize) -> i64 {
    if count == 0 {
        return 0;
    }
    let total: i128 = records.map(|r| i128::from(r.duration_seconds)).sum();
    // integer division truncates toward zero
    (total / count as i128) as i64
}
