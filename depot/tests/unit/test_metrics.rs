//! Metrics aggregator tests

use std::num::NonZeroUsize;
use std::sync::Arc;

use cidepot::ledger::BuildLedger;
use cidepot::metrics::MetricsAggregator;
use cidepot::models::build::{BuildRecord, BuildStatus};

async fn aggregator_with(records: Vec<BuildRecord>) -> (Arc<BuildLedger>, MetricsAggregator) {
    let ledger = Arc::new(BuildLedger::in_memory("builds"));
    for record in records {
        ledger.append(record).await.unwrap();
    }
    let aggregator = MetricsAggregator::new(ledger.clone());
    (ledger, aggregator)
}

#[tokio::test]
async fn test_success_rate_and_average_duration() {
    let statuses = [
        BuildStatus::Success,
        BuildStatus::Success,
        BuildStatus::Failure,
        BuildStatus::Success,
    ];
    let records = statuses
        .iter()
        .zip([10, 20, 30, 40])
        .enumerate()
        .map(|(i, (status, duration))| BuildRecord::new("calc", i as u64 + 1, duration, *status))
        .collect();
    let (_, aggregator) = aggregator_with(records).await;

    assert_eq!(aggregator.success_rate(), 75.0);
    assert_eq!(aggregator.average_duration(), 25);
}

#[tokio::test]
async fn test_empty_ledger() {
    let (_, aggregator) = aggregator_with(Vec::new()).await;
    assert_eq!(aggregator.success_rate(), 0.0);
    assert_eq!(aggregator.average_duration(), 0);
    assert!(aggregator.recent_summary(NonZeroUsize::MIN).is_empty());
}

#[tokio::test]
async fn test_average_duration_truncates_and_is_stable() {
    let (_, aggregator) = aggregator_with(vec![
        BuildRecord::new("calc", 1, 10, BuildStatus::Success),
        BuildRecord::new("calc", 2, 11, BuildStatus::Success),
    ])
    .await;

    let first = aggregator.average_duration();
    let second = aggregator.average_duration();
    assert_eq!(first, 10);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_failures_never_raise_success_rate() {
    let (ledger, aggregator) = aggregator_with(vec![
        BuildRecord::new("calc", 1, 10, BuildStatus::Success),
        BuildRecord::new("calc", 2, 10, BuildStatus::Unstable),
    ])
    .await;

    let mut previous = aggregator.success_rate();
    for i in 3..8 {
        ledger
            .append(BuildRecord::new("calc", i, 10, BuildStatus::Failure))
            .await
            .unwrap();
        let current = aggregator.success_rate();
        assert!(current <= previous);
        previous = current;
    }
}

#[tokio::test]
async fn test_recent_summary_and_report() {
    let (_, aggregator) = aggregator_with(vec![
        BuildRecord::new("calc", 1, 30, BuildStatus::Success)
            .with_tests(10, 10, 0)
            .with_coverage(80.0),
        BuildRecord::new("calc", 2, 40, BuildStatus::Failure)
            .with_tests(10, 7, 3)
            .with_coverage(70.0),
        BuildRecord::new("calc", 3, 50, BuildStatus::Unstable)
            .with_tests(10, 9, 1)
            .with_coverage(90.0),
    ])
    .await;

    let recent = aggregator.recent_summary(NonZeroUsize::new(2).unwrap());
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].build_number, 2);
    assert_eq!(recent[0].tests_ratio(), "7/10");
    assert_eq!(recent[1].status, BuildStatus::Unstable);

    let report = aggregator.report(NonZeroUsize::new(10).unwrap());
    assert_eq!(report.total_builds, 3);
    assert_eq!(report.successful_builds, 1);
    assert_eq!(report.failed_builds, 1);
    assert_eq!(report.unstable_builds, 1);
    assert_eq!(report.average_duration_secs, 40);
    assert!((report.average_coverage - 80.0).abs() < 1e-9);
    assert!((report.test_pass_rate - 86.666_666).abs() < 1e-3);
    assert_eq!(report.recent.len(), 3);
}
