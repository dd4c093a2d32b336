//! Deployment manager tests

use std::sync::Arc;
use std::time::Duration;

use tokio_test::{assert_err, assert_ok};

use cidepot::deploy::fsm::EnvironmentState;
use cidepot::deploy::health::NonEmptyHealthCheck;
use cidepot::deploy::DeploySettings;
use cidepot::errors::DepotError;
use cidepot::filesys::dir::Dir;
use cidepot::models::deployment::{DeploymentAction, DeploymentStatus, Environment};
use cidepot::notify::Notifier;

use crate::fixtures::{Depot, GatedChannel, GatedHealthCheck, StalledHealthCheck};

#[tokio::test]
async fn test_first_deploy_creates_no_backup() {
    let depot = Depot::new("deploy_first").await;
    let content_a = depot.release("a", "print('A')").await;

    let record = assert_ok!(depot.manager.deploy(Environment::Staging, &content_a, "1.0.0").await);
    assert_eq!(record.status, DeploymentStatus::Success);
    assert_eq!(record.action, DeploymentAction::Deploy);
    assert!(record.backup_path.is_none());

    assert!(depot.manager.backups(Environment::Staging).await.unwrap().is_empty());
    assert_eq!(depot.deployed(Environment::Staging).await.as_deref(), Some("print('A')"));

    let active = depot.manager.active(Environment::Staging).await.unwrap().unwrap();
    assert_eq!(active.version, "1.0.0");
    assert_eq!(active.digest, Some(Dir::new(&content_a).digest().await.unwrap()));

    depot.cleanup().await;
}

#[tokio::test]
async fn test_failed_health_check_keeps_previous_content() {
    let depot = Depot::new("deploy_staging_scenario").await;
    let content_a = depot.release("a", "print('A')").await;
    let content_b = depot.broken_release("b").await;

    assert_ok!(depot.manager.deploy(Environment::Staging, &content_a, "1.0.0").await);

    let result = depot.manager.deploy(Environment::Staging, &content_b, "1.0.1").await;
    assert!(matches!(result, Err(DepotError::HealthCheckFailed { .. })));

    // still serving A
    assert_eq!(depot.deployed(Environment::Staging).await.as_deref(), Some("print('A')"));
    assert!(!Dir::new(depot.manager.location(Environment::Staging).await.unwrap())
        .file("README")
        .exists()
        .await);
    assert_eq!(
        depot.manager.active(Environment::Staging).await.unwrap().unwrap().version,
        "1.0.0"
    );
    assert_eq!(
        depot.manager.state(Environment::Staging).await.unwrap(),
        EnvironmentState::Deployed
    );

    // one unused backup of A
    let backups = depot.manager.backups(Environment::Staging).await.unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(backups[0].version.as_deref(), Some("1.0.0"));
    assert_eq!(
        Dir::new(&backups[0].content_ref).digest().await.unwrap(),
        Dir::new(&content_a).digest().await.unwrap()
    );

    // and a failed record
    let history = depot.history.all();
    assert_eq!(history.len(), 2);
    let failed = history.iter().last().unwrap();
    assert_eq!(failed.status, DeploymentStatus::Failed);
    assert_eq!(failed.version, "1.0.1");
    assert_eq!(failed.backup_path.as_ref(), Some(&backups[0].content_ref));
    assert!(failed.message.is_some());

    depot.cleanup().await;
}

#[tokio::test]
async fn test_failed_first_deploy_leaves_environment_empty() {
    let depot = Depot::new("deploy_failed_first").await;
    let broken = depot.broken_release("broken").await;

    let result = depot.manager.deploy(Environment::Production, &broken, "1.0.0").await;
    assert!(matches!(result, Err(DepotError::HealthCheckFailed { .. })));

    let location = Dir::new(depot.manager.location(Environment::Production).await.unwrap());
    assert!(!location.file("README").exists().await);
    assert!(depot.manager.active(Environment::Production).await.unwrap().is_none());
    assert_eq!(
        depot.manager.state(Environment::Production).await.unwrap(),
        EnvironmentState::Empty
    );

    depot.cleanup().await;
}

#[tokio::test]
async fn test_retention_after_six_deploys_on_empty_environment() {
    let depot = Depot::new("deploy_retention_empty").await;

    for i in 0..6 {
        let content = depot.release(&format!("v{}", i), &format!("print({})", i)).await;
        assert_ok!(depot.manager.deploy(Environment::Staging, &content, &format!("1.0.{}", i)).await);
    }

    let backups = depot.manager.backups(Environment::Staging).await.unwrap();
    assert_eq!(backups.len(), 5);
    let versions: Vec<_> = backups.iter().map(|b| b.version.clone().unwrap()).collect();
    assert_eq!(versions, vec!["1.0.0", "1.0.1", "1.0.2", "1.0.3", "1.0.4"]);

    depot.cleanup().await;
}

#[tokio::test]
async fn test_retention_evicts_oldest_backup() {
    let depot = Depot::new("deploy_retention").await;

    let seed = depot.release("seed", "print('seed')").await;
    assert_ok!(depot.manager.deploy(Environment::Staging, &seed, "1.0.0").await);

    let mut first_backup = None;
    for i in 1..=6 {
        let content = depot.release(&format!("v{}", i), &format!("print({})", i)).await;
        let record = assert_ok!(
            depot.manager.deploy(Environment::Staging, &content, &format!("1.0.{}", i)).await
        );
        if i == 1 {
            first_backup = record.backup_path;
        }
    }

    let backups = depot.manager.backups(Environment::Staging).await.unwrap();
    assert_eq!(backups.len(), 5);
    let versions: Vec<_> = backups.iter().map(|b| b.version.clone().unwrap()).collect();
    assert_eq!(versions, vec!["1.0.1", "1.0.2", "1.0.3", "1.0.4", "1.0.5"]);

    // the seed snapshot is gone from disk
    let evicted = first_backup.unwrap();
    assert!(!backups.iter().any(|b| b.content_ref == evicted));
    assert!(!Dir::new(&evicted).exists().await);

    depot.cleanup().await;
}

#[tokio::test]
async fn test_invalid_requests_are_rejected_before_mutation() {
    let depot = Depot::new("deploy_invalid").await;
    let content = depot.release("a", "print('A')").await;

    let bad_version = depot.manager.deploy(Environment::Staging, &content, "latest").await;
    assert!(matches!(bad_version, Err(DepotError::ValidationError(_))));

    let missing = depot.root.subdir("nope").path().to_path_buf();
    let missing_content = depot.manager.deploy(Environment::Staging, &missing, "1.0.0").await;
    assert!(matches!(missing_content, Err(DepotError::ValidationError(_))));

    let slot = depot.manager.deploy(Environment::Blue, &content, "1.0.0").await;
    assert!(matches!(slot, Err(DepotError::InvalidEnvironment(_))));

    assert!(depot.history.is_empty());
    assert!(depot.deployed(Environment::Staging).await.is_none());

    depot.cleanup().await;
}

#[test]
fn test_unknown_environment() {
    assert!(matches!(
        "qa".parse::<Environment>(),
        Err(DepotError::InvalidEnvironment(_))
    ));
}

#[tokio::test]
async fn test_health_check_timeout_reverts() {
    let settings = DeploySettings {
        health_check_timeout: Duration::from_millis(50),
        ..Default::default()
    };
    let depot = Depot::with_health("deploy_timeout", Arc::new(StalledHealthCheck), settings).await;
    let content = depot.release("a", "print('A')").await;

    let result = depot.manager.deploy(Environment::Staging, &content, "1.0.0").await;
    assert!(matches!(result, Err(DepotError::HealthCheckFailed { .. })));
    assert!(depot.deployed(Environment::Staging).await.is_none());

    depot.cleanup().await;
}

#[tokio::test]
async fn test_busy_environment_fails_fast() {
    let gate = Arc::new(GatedHealthCheck::default());
    let depot = Depot::with_health("deploy_busy", gate.clone(), DeploySettings::default()).await;
    let content_a = depot.release("a", "print('A')").await;
    let content_b = depot.release("b", "print('B')").await;

    let manager = depot.manager.clone();
    let first = {
        let content_a = content_a.clone();
        tokio::spawn(async move { manager.deploy(Environment::Staging, content_a, "1.0.0").await })
    };
    gate.entered.notified().await;

    // same environment is busy
    let second = depot.manager.deploy(Environment::Staging, &content_b, "1.0.1").await;
    assert!(matches!(second, Err(DepotError::EnvironmentBusy(_))));
    let rollback = depot.rollback.rollback(Environment::Staging).await;
    assert!(matches!(rollback, Err(DepotError::EnvironmentBusy(_))));

    // other environments are independent
    assert_ok!(depot.manager.deploy(Environment::Production, &content_b, "1.0.1").await);

    gate.release.notify_one();
    let first = first.await.unwrap();
    assert_ok!(first);
    assert_eq!(depot.deployed(Environment::Staging).await.as_deref(), Some("print('A')"));

    depot.cleanup().await;
}

#[tokio::test]
async fn test_dropped_caller_does_not_interrupt_deploy() {
    let gate = Arc::new(GatedHealthCheck::default());
    let depot = Depot::with_health("deploy_cancel", gate.clone(), DeploySettings::default()).await;
    let content = depot.release("a", "print('A')").await;

    let manager = depot.manager.clone();
    let caller = tokio::spawn(async move { manager.deploy(Environment::Staging, content, "1.0.0").await });
    gate.entered.notified().await;

    caller.abort();
    assert_err!(caller.await);

    gate.release.notify_one();

    // waits for the slot lock, so the deploy has finished
    let active = depot.manager.active(Environment::Staging).await.unwrap();
    assert_eq!(active.unwrap().version, "1.0.0");
    assert_eq!(
        depot.manager.state(Environment::Staging).await.unwrap(),
        EnvironmentState::Deployed
    );
    assert_eq!(depot.history.len(), 1);

    depot.cleanup().await;
}

#[tokio::test]
async fn test_state_survives_restart() {
    let depot = Depot::new("deploy_restart").await;
    let content_a = depot.release("a", "print('A')").await;
    let content_b = depot.release("b", "print('B')").await;
    assert_ok!(depot.manager.deploy(Environment::Staging, &content_a, "1.0.0").await);
    assert_ok!(depot.manager.deploy(Environment::Staging, &content_b, "1.1.0").await);

    let root = depot.root.clone();
    drop(depot);

    let reopened = Depot::open(root, Arc::new(NonEmptyHealthCheck), DeploySettings::default()).await;
    let active = reopened.manager.active(Environment::Staging).await.unwrap().unwrap();
    assert_eq!(active.version, "1.1.0");
    assert_eq!(reopened.manager.backups(Environment::Staging).await.unwrap().len(), 1);
    assert_eq!(reopened.history.len(), 2);
    assert_eq!(
        reopened.manager.state(Environment::Staging).await.unwrap(),
        EnvironmentState::Deployed
    );

    reopened.cleanup().await;
}

#[tokio::test]
async fn test_empty_configured_location_is_not_backed_up() {
    let depot = Depot::new("deploy_empty_location").await;
    let location = depot.manager.location(Environment::Staging).await.unwrap();
    Dir::new(&location).create().await.unwrap();
    let content = depot.release("a", "print('A')").await;

    let record = assert_ok!(depot.manager.deploy(Environment::Staging, &content, "1.0.0").await);
    assert!(record.backup_path.is_none());
    assert!(depot.manager.backups(Environment::Staging).await.unwrap().is_empty());
    assert!(!depot.root.subdir("backups").subdir("staging").exists().await);

    // nothing to roll back to
    let rollback = depot.rollback.rollback(Environment::Staging).await;
    assert!(matches!(rollback, Err(DepotError::NoBackupAvailable(_))));

    depot.cleanup().await;
}

#[tokio::test]
async fn test_unsaved_state_reverts_deploy() {
    let depot = Depot::new("deploy_unsaved_state").await;
    let content = depot.release("a", "print('A')").await;

    // the state file cannot be replaced while a directory sits on its temp path
    depot.root.subdir("state").subdir("staging.tmp").create().await.unwrap();

    let result = depot.manager.deploy(Environment::Staging, &content, "1.0.0").await;
    assert!(matches!(result, Err(DepotError::StorageError(_))));

    assert!(depot.deployed(Environment::Staging).await.is_none());
    assert!(depot.manager.active(Environment::Staging).await.unwrap().is_none());
    assert_eq!(
        depot.manager.state(Environment::Staging).await.unwrap(),
        EnvironmentState::Empty
    );

    let history = depot.history.all();
    assert_eq!(history.len(), 1);
    let record = history.iter().last().unwrap();
    assert_eq!(record.status, DeploymentStatus::Failed);
    assert_eq!(record.version, "1.0.0");
    assert!(record.message.is_some());

    depot.cleanup().await;
}

#[tokio::test]
async fn test_environment_is_released_before_notifying() {
    let channel = GatedChannel::default();
    let depot = Depot::with_notifier(
        "deploy_notify_released",
        Notifier::new(vec![Box::new(channel.clone())]),
    )
    .await;
    let content = depot.release("a", "print('A')").await;

    let manager = depot.manager.clone();
    let deploy = tokio::spawn(async move { manager.deploy(Environment::Staging, content, "1.0.0").await });
    channel.entered.notified().await;

    // committed and unlocked while the notification is still in flight
    let rollback = depot.rollback.rollback(Environment::Staging).await;
    assert!(matches!(rollback, Err(DepotError::NoBackupAvailable(_))));
    assert_eq!(
        depot.manager.active(Environment::Staging).await.unwrap().unwrap().version,
        "1.0.0"
    );

    channel.release.notify_one();
    let record = deploy.await.unwrap().unwrap();
    assert_eq!(record.status, DeploymentStatus::Success);

    let delivered = channel.delivered.lock().unwrap().clone();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].job_name, "deploy:staging");
    assert_eq!(delivered[0].build_number, None);

    depot.cleanup().await;
}

#[tokio::test]
async fn test_second_handle_on_same_root_is_excluded_and_reloads_state() {
    let gate = Arc::new(GatedHealthCheck::default());
    let service = Depot::with_health("deploy_two_handles", gate.clone(), DeploySettings::default()).await;
    let cli = Depot::open(
        service.root.clone(),
        Arc::new(NonEmptyHealthCheck),
        DeploySettings::default(),
    )
    .await;
    let content_a = service.release("a", "print('A')").await;
    let content_b = service.release("b", "print('B')").await;

    let manager = service.manager.clone();
    let first = {
        let content_a = content_a.clone();
        tokio::spawn(async move { manager.deploy(Environment::Staging, content_a, "1.0.0").await })
    };
    gate.entered.notified().await;

    let busy = cli.manager.deploy(Environment::Staging, &content_b, "1.1.0").await;
    assert!(matches!(busy, Err(DepotError::EnvironmentBusy(_))));
    let busy = cli.rollback.rollback(Environment::Staging).await;
    assert!(matches!(busy, Err(DepotError::EnvironmentBusy(_))));

    gate.release.notify_one();
    assert_ok!(first.await.unwrap());

    // the second handle builds on what the first committed
    let record = assert_ok!(cli.manager.deploy(Environment::Staging, &content_b, "1.1.0").await);
    assert!(record.backup_path.is_some());
    let backups = cli.manager.backups(Environment::Staging).await.unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(backups[0].version.as_deref(), Some("1.0.0"));

    // and the first sees the result
    let active = service.manager.active(Environment::Staging).await.unwrap().unwrap();
    assert_eq!(active.version, "1.1.0");
    assert_eq!(service.manager.backups(Environment::Staging).await.unwrap().len(), 1);

    assert_eq!(cli.history.len(), 2);
    assert_eq!(service.history.sync().await.unwrap(), 1);
    assert_eq!(service.history.len(), 2);

    drop(cli);
    service.cleanup().await;
}
