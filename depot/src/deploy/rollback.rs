//! Restore an environment to its most recent backup

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::deploy::fsm::EnvironmentEvent;
use crate::deploy::health::HealthStatus;
use crate::deploy::manager::{DeploymentManager, Inner};
use crate::errors::DepotError;
use crate::filesys::lock::hold_or_busy;
use crate::models::deployment::{
    DeploymentAction, DeploymentRecord, DeploymentStatus, Environment,
};

/// Version reported when a backup predates version tracking
const UNKNOWN_VERSION: &str = "unknown";

/// Rolls environments back using the manager's backup registry.
///
/// A rollback whose health check fails is terminal for that call: the record
/// says `failed`, the restored content stays in place, and nothing further is
/// attempted automatically.
#[derive(Clone)]
pub struct RollbackController {
    inner: Arc<Inner>,
}

impl RollbackController {
    pub fn new(manager: &DeploymentManager) -> Self {
        Self {
            inner: manager.inner(),
        }
    }

    /// Restore the latest backup of `environment`
    pub async fn rollback(&self, environment: Environment) -> Result<DeploymentRecord, DepotError> {
        let inner = self.inner.clone();
        tokio::spawn(async move { inner.rollback(environment).await }).await?
    }
}

impl Inner {
    async fn rollback(&self, environment: Environment) -> Result<DeploymentRecord, DepotError> {
        let mut recorded = None;
        let result = self.attempt_rollback(environment, &mut recorded).await;
        if let Some(record) = &recorded {
            self.announce(record).await;
        }
        result
    }

    async fn attempt_rollback(
        &self,
        environment: Environment,
        recorded: &mut Option<DeploymentRecord>,
    ) -> Result<DeploymentRecord, DepotError> {
        let mut slot = self.acquire(environment)?;
        let mut lease = slot.lease().await?;
        let _held = hold_or_busy(&mut lease, environment.as_str())?;
        slot.refresh().await?;

        let backup = slot
            .backups
            .latest()
            .cloned()
            .ok_or_else(|| DepotError::NoBackupAvailable(environment.to_string()))?;

        slot.transition(EnvironmentEvent::Rollback)?;
        info!(
            "Rolling back {} to backup {}",
            environment,
            backup.content_ref.display()
        );

        if let Err(e) = self.content.restore(&backup.content_ref, &slot.location).await {
            slot.transition(EnvironmentEvent::Revert(e.to_string()))?;
            return Err(e);
        }

        let version = backup
            .version
            .clone()
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string());
        slot.mark_active(&version).await;

        let (mut status, mut message) = match self.verify(environment, &slot.location).await {
            HealthStatus::Healthy => {
                slot.transition(EnvironmentEvent::Restored)?;
                info!("Rolled back {} to {}", environment, version);
                (DeploymentStatus::Success, None)
            }
            HealthStatus::Unhealthy(reason) => {
                slot.transition(EnvironmentEvent::RestoredUnhealthy(reason.clone()))?;
                warn!(
                    "Rollback of {} to {} is unhealthy, operator action needed: {}",
                    environment, version, reason
                );
                (DeploymentStatus::Failed, Some(reason))
            }
        };

        // Restored content stays in place even when its state cannot be saved
        let persisted = slot.persist().await;
        if let Err(e) = &persisted {
            error!("Restored {} on {} but could not save it: {}", version, environment, e);
            status = DeploymentStatus::Failed;
            message = Some(e.to_string());
        }

        let record = DeploymentRecord {
            environment,
            timestamp: Utc::now(),
            version,
            status,
            action: DeploymentAction::Rollback,
            backup_path: Some(backup.content_ref),
            message,
        };
        let record = self.finish(record, recorded).await?;
        persisted?;
        Ok(record)
    }
}
