//! Shared test fixtures

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use cidepot::deploy::content::FsContentStore;
use cidepot::deploy::health::{HealthCheck, HealthStatus, MarkerFileHealthCheck};
use cidepot::deploy::{DeploySettings, DeploymentConfig, DeploymentManager, RollbackController};
use cidepot::errors::DepotError;
use cidepot::filesys::dir::Dir;
use cidepot::ledger::DeploymentLedger;
use cidepot::models::deployment::Environment;
use cidepot::notify::{Channel, Notification, Notifier};

/// Every healthy release carries this file
pub const ENTRYPOINT: &str = "app.py";

/// A deployment manager over a throwaway directory
pub struct Depot {
    pub root: Dir,
    pub manager: DeploymentManager,
    pub rollback: RollbackController,
    pub history: Arc<DeploymentLedger>,
}

impl Depot {
    /// Manager whose health check requires `app.py` in the deployed directory
    pub async fn new(prefix: &str) -> Self {
        Self::with_health(prefix, Arc::new(MarkerFileHealthCheck::new(ENTRYPOINT)), DeploySettings::default())
            .await
    }

    pub async fn with_health(
        prefix: &str,
        health: Arc<dyn HealthCheck>,
        settings: DeploySettings,
    ) -> Self {
        let root = Dir::create_temp_dir(prefix).await.unwrap();
        Self::open(root, health, settings).await
    }

    /// Manager with the default marker check that notifies through `notifier`
    pub async fn with_notifier(prefix: &str, notifier: Notifier) -> Self {
        let root = Dir::create_temp_dir(prefix).await.unwrap();
        Self::open_with(
            root,
            Arc::new(MarkerFileHealthCheck::new(ENTRYPOINT)),
            DeploySettings::default(),
            notifier,
        )
        .await
    }

    /// Open a manager over an existing root, as after a restart or from a
    /// second process
    pub async fn open(root: Dir, health: Arc<dyn HealthCheck>, settings: DeploySettings) -> Self {
        Self::open_with(root, health, settings, Notifier::disabled()).await
    }

    pub async fn open_with(
        root: Dir,
        health: Arc<dyn HealthCheck>,
        settings: DeploySettings,
        notifier: Notifier,
    ) -> Self {
        let environments: HashMap<Environment, PathBuf> = Environment::ALL
            .iter()
            .map(|env| (*env, root.subdir("slots").subdir(env.as_str()).path().to_path_buf()))
            .collect();

        let history = Arc::new(
            DeploymentLedger::open("deployments", root.subdir("ledger").file("deployments.jsonl"))
                .await
                .unwrap(),
        );
        let config = DeploymentConfig {
            environments,
            state_dir: root.subdir("state"),
            settings,
        };
        let manager = DeploymentManager::open(
            config,
            Arc::new(FsContentStore::new(root.subdir("backups"))),
            health,
            history.clone(),
            Arc::new(notifier),
        )
        .await
        .unwrap();
        let rollback = RollbackController::new(&manager);

        Self {
            root,
            manager,
            rollback,
            history,
        }
    }

    /// Write a healthy release directory holding `app.py` with `body`
    pub async fn release(&self, name: &str, body: &str) -> PathBuf {
        let dir = self.root.subdir("releases").subdir(name);
        dir.file(ENTRYPOINT).write_bytes(body.as_bytes()).await.unwrap();
        dir.path().to_path_buf()
    }

    /// Write a release without `app.py`, which fails the health check
    pub async fn broken_release(&self, name: &str) -> PathBuf {
        let dir = self.root.subdir("releases").subdir(name);
        dir.file("README").write_bytes(b"missing entrypoint").await.unwrap();
        dir.path().to_path_buf()
    }

    /// Bytes of `app.py` currently deployed to `environment`
    pub async fn deployed(&self, environment: Environment) -> Option<String> {
        let location = self.manager.location(environment).await.unwrap();
        let file = Dir::new(location).file(ENTRYPOINT);
        if !file.exists().await {
            return None;
        }
        Some(file.read_string().await.unwrap())
    }

    pub async fn cleanup(self) {
        self.root.delete().await.unwrap();
    }
}

/// Health check that parks staging checks until released
#[derive(Default)]
pub struct GatedHealthCheck {
    pub entered: Notify,
    pub release: Notify,
}

#[async_trait]
impl HealthCheck for GatedHealthCheck {
    async fn check(&self, environment: Environment, _location: &Path) -> HealthStatus {
        if environment == Environment::Staging {
            self.entered.notify_one();
            self.release.notified().await;
        }
        HealthStatus::Healthy
    }
}

/// Health check that never answers
pub struct StalledHealthCheck;

#[async_trait]
impl HealthCheck for StalledHealthCheck {
    async fn check(&self, _environment: Environment, _location: &Path) -> HealthStatus {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        HealthStatus::Healthy
    }
}

/// Channel that holds each delivery until released, keeping what it saw
#[derive(Clone, Default)]
pub struct GatedChannel {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
    pub delivered: Arc<Mutex<Vec<Notification>>>,
}

#[async_trait]
impl Channel for GatedChannel {
    fn name(&self) -> &str {
        "gated"
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), DepotError> {
        self.entered.notify_one();
        self.release.notified().await;
        self.delivered.lock().unwrap().push(notification.clone());
        Ok(())
    }
}
