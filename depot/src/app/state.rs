//! Application state management

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::deploy::content::FsContentStore;
use crate::deploy::health::{
    CommandHealthCheck, HealthCheck, MarkerFileHealthCheck, NonEmptyHealthCheck,
};
use crate::deploy::{DeploymentConfig, DeploymentManager, RollbackController};
use crate::errors::DepotError;
use crate::ledger::{BuildLedger, DeploymentLedger, RecordId};
use crate::metrics::MetricsAggregator;
use crate::models::build::BuildRecord;
use crate::notify::{ConsoleChannel, LogFileChannel, Notifier, WebhookChannel};
use crate::storage::layout::StorageLayout;
use crate::storage::settings::{HealthCheckSettings, NotifierSettings, Settings};

/// Main application state
pub struct AppState {
    /// Storage layout paths
    pub layout: StorageLayout,

    /// Build outcome ledger
    pub builds: Arc<BuildLedger>,

    /// Statistics over the build ledger
    pub metrics: MetricsAggregator,

    pub deployments: DeploymentManager,

    pub rollback: RollbackController,

    pub notifier: Arc<Notifier>,
}

impl AppState {
    /// Initialize application state
    pub async fn init(layout: &StorageLayout, settings: &Settings) -> Result<Self, DepotError> {
        info!("Initializing application state...");

        settings.validate()?;
        layout.setup().await?;

        let builds = Arc::new(BuildLedger::open("builds", layout.builds_ledger_file()).await?);
        let history = Arc::new(
            DeploymentLedger::open("deployments", layout.deployments_ledger_file()).await?,
        );
        info!(
            "Loaded {} build records and {} deployment records",
            builds.len(),
            history.len()
        );

        let notifier = Arc::new(build_notifier(&settings.notifier, layout)?);
        let health = build_health_check(&settings.health_check);

        let config = DeploymentConfig {
            environments: settings.environment_locations(layout),
            state_dir: layout.state_dir(),
            settings: settings.deploy_settings(),
        };
        let deployments = DeploymentManager::open(
            config,
            Arc::new(FsContentStore::new(layout.backups_dir())),
            health,
            history,
            notifier.clone(),
        )
        .await?;
        let rollback = RollbackController::new(&deployments);

        Ok(Self {
            layout: layout.clone(),
            metrics: MetricsAggregator::new(builds.clone()),
            builds,
            deployments,
            rollback,
            notifier,
        })
    }

    /// Append a build outcome and announce it
    pub async fn record_build(&self, record: BuildRecord) -> Result<RecordId, DepotError> {
        let id = self.builds.append(record.clone()).await?;

        let mut message = format!("build finished in {}s", record.duration_seconds);
        if record.tests_total > 0 {
            message.push_str(&format!(
                ", tests {}/{} passed",
                record.tests_passed, record.tests_total
            ));
        }
        self.notifier
            .notify(
                record.status.into(),
                message,
                record.job_name.clone(),
                Some(record.build_number),
            )
            .await;

        Ok(id)
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), DepotError> {
        info!(
            "Shutting down application state ({} builds, {} deployments recorded)",
            self.builds.len(),
            self.deployments.history().len()
        );
        Ok(())
    }
}

/// Assemble the notifier from its configured channels
pub fn build_notifier(
    settings: &NotifierSettings,
    layout: &StorageLayout,
) -> Result<Notifier, DepotError> {
    let mut notifier = Notifier::disabled();
    if settings.console {
        notifier = notifier.with_channel(Box::new(ConsoleChannel));
    }
    if settings.log_file {
        notifier = notifier.with_channel(Box::new(LogFileChannel::new(layout.notifications_file())));
    }
    if let Some(url) = &settings.webhook_url {
        let timeout = Duration::from_secs(settings.webhook_timeout_secs);
        notifier = notifier.with_channel(Box::new(WebhookChannel::new(url.clone(), timeout)?));
    }

    if notifier.channel_names().is_empty() {
        warn!("No notification channels configured");
    }
    Ok(notifier)
}

/// A configured command wins over a marker file; with neither, any non-empty
/// directory is healthy
pub fn build_health_check(settings: &HealthCheckSettings) -> Arc<dyn HealthCheck> {
    if let Some(command) = &settings.command {
        return Arc::new(CommandHealthCheck::new(command.clone(), settings.args.clone()));
    }
    if let Some(marker) = &settings.marker_file {
        return Arc::new(MarkerFileHealthCheck::new(marker.clone()));
    }
    Arc::new(NonEmptyHealthCheck)
}
