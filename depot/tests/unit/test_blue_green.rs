//! Blue-green deployment tests

use std::sync::Arc;

use tokio_test::assert_ok;

use cidepot::deploy::fsm::EnvironmentState;
use cidepot::deploy::health::NonEmptyHealthCheck;
use cidepot::deploy::DeploySettings;
use cidepot::errors::DepotError;
use cidepot::models::deployment::{DeploymentAction, DeploymentStatus, Environment};

use crate::fixtures::Depot;

#[tokio::test]
async fn test_alias_alternates_between_slots() {
    let depot = Depot::new("bg_alternate").await;
    assert_eq!(depot.manager.live_slot().await, None);

    let mut expected = Environment::Blue;
    for i in 0..4 {
        let content = depot.release(&format!("r{}", i), &format!("print({})", i)).await;
        let record = assert_ok!(
            depot.manager.deploy_blue_green(&content, &format!("2.0.{}", i)).await
        );

        assert_eq!(record.action, DeploymentAction::BlueGreen);
        assert_eq!(record.status, DeploymentStatus::Success);
        assert_eq!(record.environment, expected);
        assert_eq!(depot.manager.live_slot().await, Some(expected));
        assert_eq!(depot.deployed(expected).await, Some(format!("print({})", i)));

        expected = expected.counterpart().unwrap();
    }

    depot.cleanup().await;
}

#[tokio::test]
async fn test_failed_deploy_never_moves_alias() {
    let depot = Depot::new("bg_failed").await;
    let r1 = depot.release("r1", "print('one')").await;
    let r2 = depot.release("r2", "print('two')").await;
    let broken = depot.broken_release("broken").await;

    assert_ok!(depot.manager.deploy_blue_green(&r1, "2.0.0").await);
    assert_ok!(depot.manager.deploy_blue_green(&r2, "2.1.0").await);
    assert_eq!(depot.manager.live_slot().await, Some(Environment::Green));

    let result = depot.manager.deploy_blue_green(&broken, "2.2.0").await;
    assert!(matches!(result, Err(DepotError::HealthCheckFailed { .. })));

    // green keeps serving, blue is marked unusable
    assert_eq!(depot.manager.live_slot().await, Some(Environment::Green));
    assert_eq!(depot.deployed(Environment::Green).await.as_deref(), Some("print('two')"));
    assert!(depot.manager.active(Environment::Blue).await.unwrap().is_none());
    assert_eq!(
        depot.manager.state(Environment::Blue).await.unwrap(),
        EnvironmentState::Empty
    );

    let failed = depot.history.all().iter().last().cloned().unwrap();
    assert_eq!(failed.environment, Environment::Blue);
    assert_eq!(failed.status, DeploymentStatus::Failed);

    // the next good release lands on blue again
    let r3 = depot.release("r3", "print('three')").await;
    let record = assert_ok!(depot.manager.deploy_blue_green(&r3, "2.3.0").await);
    assert_eq!(record.environment, Environment::Blue);
    assert_eq!(depot.manager.live_slot().await, Some(Environment::Blue));

    depot.cleanup().await;
}

#[tokio::test]
async fn test_alias_survives_restart() {
    let depot = Depot::new("bg_restart").await;
    let r1 = depot.release("r1", "print('one')").await;
    assert_ok!(depot.manager.deploy_blue_green(&r1, "2.0.0").await);

    let alias = depot.root.subdir("state").file("live");
    assert_eq!(alias.read_string().await.unwrap(), "blue");

    let root = depot.root.clone();
    drop(depot);
    let reopened = Depot::open(root, Arc::new(NonEmptyHealthCheck), DeploySettings::default()).await;
    assert_eq!(reopened.manager.live_slot().await, Some(Environment::Blue));

    let r2 = reopened.release("r2", "print('two')").await;
    let record = assert_ok!(reopened.manager.deploy_blue_green(&r2, "2.1.0").await);
    assert_eq!(record.environment, Environment::Green);

    reopened.cleanup().await;
}

#[tokio::test]
async fn test_blue_green_rejects_bad_version() {
    let depot = Depot::new("bg_invalid").await;
    let r1 = depot.release("r1", "print('one')").await;

    let result = depot.manager.deploy_blue_green(&r1, "v2").await;
    assert!(matches!(result, Err(DepotError::ValidationError(_))));
    assert_eq!(depot.manager.live_slot().await, None);
    assert!(depot.history.is_empty());

    depot.cleanup().await;
}
