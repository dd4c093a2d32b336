//! Build ledger tests

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;

use futures::future::join_all;
use tokio_test::{assert_err, assert_ok};

use cidepot::errors::DepotError;
use cidepot::filesys::dir::Dir;
use cidepot::ledger::BuildLedger;
use cidepot::models::build::{BuildRecord, BuildStatus};

fn n(value: usize) -> NonZeroUsize {
    NonZeroUsize::new(value).unwrap()
}

#[tokio::test]
async fn test_append_then_list_recent_returns_record() {
    let ledger = BuildLedger::in_memory("builds");
    let records = [
        BuildRecord::new("calc", 1, 12, BuildStatus::Success).with_tests(10, 10, 0),
        BuildRecord::new("calc", 2, 0, BuildStatus::Unknown),
        BuildRecord::new("web", 7, 300, BuildStatus::Unstable).with_coverage(64.5),
    ];

    for record in records {
        assert_ok!(ledger.append(record.clone()).await);
        assert_eq!(ledger.list_recent(n(1)), vec![record]);
    }
}

#[tokio::test]
async fn test_list_recent_is_bounded() {
    let ledger = BuildLedger::in_memory("builds");
    assert!(ledger.list_recent(n(5)).is_empty());

    for i in 1..=7 {
        ledger
            .append(BuildRecord::new("calc", i, 5, BuildStatus::Success))
            .await
            .unwrap();
    }

    for window in [1, 3, 7, 50] {
        let recent = ledger.list_recent(n(window));
        assert!(recent.len() <= window);
        assert!(recent.len() <= ledger.len());
    }

    let numbers: Vec<u64> = ledger.list_recent(n(3)).iter().map(|r| r.build_number).collect();
    assert_eq!(numbers, vec![5, 6, 7]);
}

#[tokio::test]
async fn test_invalid_records_are_rejected() {
    let ledger = BuildLedger::in_memory("builds");

    let negative = ledger
        .append(BuildRecord::new("calc", 1, -1, BuildStatus::Success))
        .await;
    assert!(matches!(negative, Err(DepotError::ValidationError(_))));

    let unnamed = ledger.append(BuildRecord::new("", 1, 1, BuildStatus::Success)).await;
    assert_err!(unnamed);

    let too_many_passed = ledger
        .append(BuildRecord::new("calc", 1, 1, BuildStatus::Success).with_tests(3, 4, 0))
        .await;
    assert_err!(too_many_passed);

    let coverage = ledger
        .append(BuildRecord::new("calc", 1, 1, BuildStatus::Success).with_coverage(120.0))
        .await;
    assert_err!(coverage);

    assert!(ledger.is_empty());
}

#[tokio::test]
async fn test_concurrent_appends_are_all_kept() {
    let dir = Dir::create_temp_dir("ledger_concurrent").await.unwrap();
    let file = dir.file("builds.jsonl");
    let ledger = Arc::new(BuildLedger::open("builds", file.clone()).await.unwrap());

    let appends = (1..=40).map(|i| {
        let ledger = ledger.clone();
        tokio::spawn(async move {
            ledger
                .append(BuildRecord::new(format!("job-{}", i % 4), i, i as i64, BuildStatus::Success))
                .await
        })
    });
    let ids: Vec<u64> = join_all(appends)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let unique: HashSet<u64> = ids.iter().copied().collect();
    assert_eq!(unique.len(), 40);
    assert_eq!(unique, (1..=40).collect());
    assert_eq!(ledger.len(), 40);

    // the file replays the same order
    let reopened = BuildLedger::open("builds", file).await.unwrap();
    let original: Vec<BuildRecord> = ledger.all().iter().cloned().collect();
    let replayed: Vec<BuildRecord> = reopened.all().iter().cloned().collect();
    assert_eq!(original, replayed);

    dir.delete().await.unwrap();
}

#[tokio::test]
async fn test_snapshot_ignores_later_appends() {
    let ledger = BuildLedger::in_memory("builds");
    ledger
        .append(BuildRecord::new("calc", 1, 5, BuildStatus::Success))
        .await
        .unwrap();

    let snapshot = ledger.all();
    ledger
        .append(BuildRecord::new("calc", 2, 5, BuildStatus::Failure))
        .await
        .unwrap();

    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.iter().count(), 1);
    assert_eq!((&snapshot).into_iter().count(), 1);
    assert_eq!(ledger.all().len(), 2);
}

#[tokio::test]
async fn test_out_of_order_file_is_refused() {
    let dir = Dir::create_temp_dir("ledger_corrupt").await.unwrap();
    let file = dir.file("builds.jsonl");
    let record = serde_json::to_string(&BuildRecord::new("calc", 1, 5, BuildStatus::Success)).unwrap();
    file.write_bytes(format!("{{\"id\":2,\"record\":{}}}\n", record).as_bytes())
        .await
        .unwrap();

    let result = BuildLedger::open("builds", file).await;
    assert!(matches!(result, Err(DepotError::StorageError(_))));

    dir.delete().await.unwrap();
}

#[tokio::test]
async fn test_two_handles_on_one_file_keep_ids_contiguous() {
    let dir = Dir::create_temp_dir("ledger_two_handles").await.unwrap();
    let file = dir.file("builds.jsonl");
    let service = BuildLedger::open("builds", file.clone()).await.unwrap();
    let cli = BuildLedger::open("builds", file.clone()).await.unwrap();

    let first = service
        .append(BuildRecord::new("calc", 1, 5, BuildStatus::Success))
        .await
        .unwrap();
    let second = cli
        .append(BuildRecord::new("calc", 2, 5, BuildStatus::Failure))
        .await
        .unwrap();
    assert_eq!((first, second), (1, 2));
    assert_eq!(cli.len(), 2);

    // the other handle catches up on demand
    assert_eq!(service.len(), 1);
    assert_eq!(service.sync().await.unwrap(), 1);
    let numbers: Vec<u64> = service.all().iter().map(|r| r.build_number).collect();
    assert_eq!(numbers, vec![1, 2]);

    let service = Arc::new(service);
    let cli = Arc::new(cli);
    let appends = (3..=22).map(|i| {
        let ledger = if i % 2 == 0 { service.clone() } else { cli.clone() };
        tokio::spawn(async move {
            ledger
                .append(BuildRecord::new("calc", i, 5, BuildStatus::Success))
                .await
        })
    });
    let ids: HashSet<u64> = join_all(appends)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();
    assert_eq!(ids, (3..=22).collect());

    let reopened = assert_ok!(BuildLedger::open("builds", file).await);
    assert_eq!(reopened.len(), 22);

    dir.delete().await.unwrap();
}

#[tokio::test]
async fn test_torn_last_line_is_replaced() {
    let dir = Dir::create_temp_dir("ledger_torn").await.unwrap();
    let file = dir.file("builds.jsonl");
    let record = serde_json::to_string(&BuildRecord::new("calc", 1, 5, BuildStatus::Success)).unwrap();
    file.write_bytes(format!("{{\"id\":1,\"record\":{}}}\n{{\"id\":2,\"rec", record).as_bytes())
        .await
        .unwrap();

    let ledger = BuildLedger::open("builds", file.clone()).await.unwrap();
    assert_eq!(ledger.len(), 1);

    let id = ledger
        .append(BuildRecord::new("calc", 2, 5, BuildStatus::Success))
        .await
        .unwrap();
    assert_eq!(id, 2);

    let reopened = BuildLedger::open("builds", file).await.unwrap();
    let numbers: Vec<u64> = reopened.all().iter().map(|r| r.build_number).collect();
    assert_eq!(numbers, vec![1, 2]);

    dir.delete().await.unwrap();
}
