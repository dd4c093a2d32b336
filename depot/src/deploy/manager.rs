//! Environment promotion with backup-before-overwrite and health verification

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::deploy::backups::{BackupSet, DEFAULT_BACKUP_RETENTION};
use crate::deploy::content::ContentStore;
use crate::deploy::fsm::{EnvironmentEvent, EnvironmentFsm, EnvironmentState};
use crate::deploy::health::{check_with_timeout, HealthCheck, HealthStatus};
use crate::errors::DepotError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::filesys::lock::{hold_or_busy, FileLock};
use crate::ledger::DeploymentLedger;
use crate::models::deployment::{
    ActiveContent, Backup, DeploymentAction, DeploymentRecord, DeploymentStatus, Environment,
};
use crate::notify::Notifier;
use crate::utils::is_semver;

/// Name of the file holding the blue-green alias
const LIVE_ALIAS_FILE: &str = "live";

const LIVE_ALIAS_LOCK: &str = "live.lock";

/// Deployment settings
#[derive(Debug, Clone)]
pub struct DeploySettings {
    /// Upper bound on a single health check
    pub health_check_timeout: Duration,

    /// Backups kept per environment
    pub backup_retention: usize,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            health_check_timeout: Duration::from_secs(10),
            backup_retention: DEFAULT_BACKUP_RETENTION,
        }
    }
}

/// Where each environment lives and where slot state is kept
#[derive(Debug, Clone)]
pub struct DeploymentConfig {
    /// Content location of every recognized environment
    pub environments: HashMap<Environment, PathBuf>,

    /// Directory for per-environment state files and the blue-green alias
    pub state_dir: Dir,

    pub settings: DeploySettings,
}

/// Slot state persisted across restarts
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedSlot {
    #[serde(default)]
    active: Option<ActiveContent>,

    #[serde(default)]
    backups: Vec<Backup>,
}

impl PersistedSlot {
    async fn read(file: &File, environment: Environment) -> Result<Self, DepotError> {
        if !file.exists().await {
            return Ok(Self::default());
        }
        file.read_json::<PersistedSlot>().await.map_err(|e| {
            DepotError::StorageError(format!("unable to read state of {}: {}", environment, e))
        })
    }
}

/// One environment: its content location, FSM, active version and backups
pub(crate) struct Slot {
    pub(crate) environment: Environment,
    pub(crate) location: PathBuf,
    state_file: File,
    lock_file: PathBuf,
    pub(crate) fsm: EnvironmentFsm,
    pub(crate) active: Option<ActiveContent>,
    pub(crate) backups: BackupSet,
}

impl Slot {
    async fn load(
        environment: Environment,
        location: PathBuf,
        state_dir: &Dir,
        retention: usize,
    ) -> Result<Self, DepotError> {
        let state_file = state_dir.file(&format!("{}.json", environment));
        let persisted = PersistedSlot::read(&state_file, environment).await?;

        Ok(Self {
            environment,
            location,
            state_file,
            lock_file: state_dir.file(&format!("{}.lock", environment)).path().to_path_buf(),
            fsm: EnvironmentFsm::new(persisted.active.is_some()),
            backups: BackupSet::from_existing(environment, retention, persisted.backups),
            active: persisted.active,
        })
    }

    /// Lock shared with every process that manages this environment
    pub(crate) async fn lease(&self) -> Result<FileLock, DepotError> {
        FileLock::open(&self.lock_file).await
    }

    /// Reload the persisted state, which another process may have changed
    pub(crate) async fn refresh(&mut self) -> Result<(), DepotError> {
        let persisted = PersistedSlot::read(&self.state_file, self.environment).await?;
        if persisted.active.is_some() != self.active.is_some() {
            self.fsm = EnvironmentFsm::new(persisted.active.is_some());
        }
        self.backups = BackupSet::from_existing(
            self.environment,
            self.backups.retention(),
            persisted.backups,
        );
        self.active = persisted.active;
        Ok(())
    }

    pub(crate) async fn persist(&self) -> Result<(), DepotError> {
        let persisted = PersistedSlot {
            active: self.active.clone(),
            backups: self.backups.list().to_vec(),
        };
        self.state_file.write_json(&persisted).await.map_err(|e| {
            DepotError::StorageError(format!(
                "unable to persist state of {}: {}",
                self.environment, e
            ))
        })
    }

    /// Record `version` as the slot's live content
    pub(crate) async fn mark_active(&mut self, version: &str) {
        let digest = match Dir::new(&self.location).digest().await {
            Ok(digest) => Some(digest),
            Err(e) => {
                warn!("Unable to fingerprint {}: {}", self.environment, e);
                None
            }
        };
        self.active = Some(ActiveContent {
            version: version.to_string(),
            deployed_at: Utc::now(),
            digest,
        });
    }

    pub(crate) fn transition(&mut self, event: EnvironmentEvent) -> Result<(), DepotError> {
        self.fsm.process(event).map_err(DepotError::TransitionError)
    }
}

/// Pointer to the live blue-green slot
struct LiveAlias {
    file: File,
    lock_file: PathBuf,
    live: Option<Environment>,
}

impl LiveAlias {
    async fn load(file: File, lock_file: PathBuf) -> Result<Self, DepotError> {
        let mut alias = Self {
            file,
            lock_file,
            live: None,
        };
        alias.refresh().await?;
        Ok(alias)
    }

    async fn refresh(&mut self) -> Result<(), DepotError> {
        self.live = if self.file.exists().await {
            let raw = self.file.read_string().await?;
            Some(raw.parse::<Environment>()?)
        } else {
            None
        };
        Ok(())
    }

    /// Repoint the alias; the rename in `write_atomic` is the switch
    async fn switch(&mut self, target: Environment) -> Result<(), DepotError> {
        self.file
            .write_atomic(target.as_str().as_bytes())
            .await
            .map_err(|e| DepotError::StorageError(format!("unable to switch live alias: {}", e)))?;
        self.live = Some(target);
        Ok(())
    }
}

pub(crate) struct Inner {
    slots: HashMap<Environment, Mutex<Slot>>,
    alias: Mutex<LiveAlias>,
    pub(crate) content: Arc<dyn ContentStore>,
    health: Arc<dyn HealthCheck>,
    history: Arc<DeploymentLedger>,
    notifier: Arc<Notifier>,
    settings: DeploySettings,
}

/// Promotes versioned content into environments.
///
/// Each environment has its own lock, held in-process and as an advisory lock
/// on `state/<env>.lock` so that other processes sharing the base directory
/// are excluded too. A second deploy or rollback on a busy environment fails
/// fast with `EnvironmentBusy`; different environments never contend. Slot
/// state is reloaded from disk once the lock is held. The critical section of
/// every operation runs on its own task, so dropping the caller's future
/// cannot stop it halfway.
#[derive(Clone)]
pub struct DeploymentManager {
    inner: Arc<Inner>,
}

impl DeploymentManager {
    /// Build a manager, loading any persisted slot state
    pub async fn open(
        config: DeploymentConfig,
        content: Arc<dyn ContentStore>,
        health: Arc<dyn HealthCheck>,
        history: Arc<DeploymentLedger>,
        notifier: Arc<Notifier>,
    ) -> Result<Self, DepotError> {
        config.state_dir.create().await?;

        let mut slots = HashMap::new();
        for (environment, location) in &config.environments {
            let slot = Slot::load(
                *environment,
                location.clone(),
                &config.state_dir,
                config.settings.backup_retention,
            )
            .await?;
            debug!(
                "Loaded {} at {} ({} backups)",
                environment,
                location.display(),
                slot.backups.len()
            );
            slots.insert(*environment, Mutex::new(slot));
        }

        let alias = LiveAlias::load(
            config.state_dir.file(LIVE_ALIAS_FILE),
            config.state_dir.file(LIVE_ALIAS_LOCK).path().to_path_buf(),
        )
        .await?;

        info!("Deployment manager ready with {} environments", slots.len());

        Ok(Self {
            inner: Arc::new(Inner {
                slots,
                alias: Mutex::new(alias),
                content,
                health,
                history,
                notifier,
                settings: config.settings,
            }),
        })
    }

    pub(crate) fn inner(&self) -> Arc<Inner> {
        self.inner.clone()
    }

    /// Deploy `content` as `version` into `environment`
    pub async fn deploy(
        &self,
        environment: Environment,
        content: impl Into<PathBuf>,
        version: &str,
    ) -> Result<DeploymentRecord, DepotError> {
        let inner = self.inner.clone();
        let content = content.into();
        let version = version.to_string();
        tokio::spawn(async move { inner.deploy(environment, content, version).await }).await?
    }

    /// Deploy into the inactive blue-green slot and switch traffic to it
    pub async fn deploy_blue_green(
        &self,
        content: impl Into<PathBuf>,
        version: &str,
    ) -> Result<DeploymentRecord, DepotError> {
        let inner = self.inner.clone();
        let content = content.into();
        let version = version.to_string();
        tokio::spawn(async move { inner.deploy_blue_green(content, version).await }).await?
    }

    /// Recognized environments, sorted
    pub fn environments(&self) -> Vec<Environment> {
        let mut environments: Vec<Environment> = self.inner.slots.keys().copied().collect();
        environments.sort();
        environments
    }

    /// Content location of an environment
    pub async fn location(&self, environment: Environment) -> Result<PathBuf, DepotError> {
        Ok(self.inner.slot(environment)?.lock().await.location.clone())
    }

    /// Version currently served by an environment
    pub async fn active(&self, environment: Environment) -> Result<Option<ActiveContent>, DepotError> {
        Ok(self.inner.view(environment).await?.active.clone())
    }

    /// Retained backups of an environment, oldest first
    pub async fn backups(&self, environment: Environment) -> Result<Vec<Backup>, DepotError> {
        Ok(self.inner.view(environment).await?.backups.list().to_vec())
    }

    /// FSM state of an environment
    pub async fn state(&self, environment: Environment) -> Result<EnvironmentState, DepotError> {
        Ok(self.inner.view(environment).await?.fsm.state())
    }

    /// Blue-green slot currently receiving traffic
    pub async fn live_slot(&self) -> Option<Environment> {
        let mut alias = self.inner.alias.lock().await;
        if let Err(e) = alias.refresh().await {
            warn!("Unable to reload the live alias: {}", e);
        }
        alias.live
    }

    /// Ledger of every deployment and rollback attempt
    pub fn history(&self) -> &Arc<DeploymentLedger> {
        &self.inner.history
    }
}

impl Inner {
    pub(crate) fn slot(&self, environment: Environment) -> Result<&Mutex<Slot>, DepotError> {
        self.slots.get(&environment).ok_or_else(|| {
            DepotError::InvalidEnvironment(format!("{} is not configured", environment))
        })
    }

    /// Slot with its persisted state reloaded
    async fn view(&self, environment: Environment) -> Result<MutexGuard<'_, Slot>, DepotError> {
        let mut slot = self.slot(environment)?.lock().await;
        if let Err(e) = slot.refresh().await {
            warn!("Showing cached state of {}: {}", environment, e);
        }
        Ok(slot)
    }

    /// Take the environment's lock without waiting
    pub(crate) fn acquire(&self, environment: Environment) -> Result<MutexGuard<'_, Slot>, DepotError> {
        self.slot(environment)?
            .try_lock()
            .map_err(|_| DepotError::EnvironmentBusy(environment.to_string()))
    }

    pub(crate) async fn verify(&self, environment: Environment, location: &Path) -> HealthStatus {
        check_with_timeout(
            self.health.as_ref(),
            environment,
            location,
            self.settings.health_check_timeout,
        )
        .await
    }

    async fn deploy(
        &self,
        environment: Environment,
        content: PathBuf,
        version: String,
    ) -> Result<DeploymentRecord, DepotError> {
        let mut recorded = None;
        let result = self.attempt_deploy(environment, content, version, &mut recorded).await;
        if let Some(record) = &recorded {
            self.announce(record).await;
        }
        result
    }

    async fn attempt_deploy(
        &self,
        environment: Environment,
        content: PathBuf,
        version: String,
        recorded: &mut Option<DeploymentRecord>,
    ) -> Result<DeploymentRecord, DepotError> {
        self.slot(environment)?;
        if environment.counterpart().is_some() {
            return Err(DepotError::InvalidEnvironment(format!(
                "{} is a blue-green slot, use a blue-green deploy",
                environment
            )));
        }
        validate_release(&content, &version).await?;

        let mut slot = self.acquire(environment)?;
        let mut lease = slot.lease().await?;
        let _held = hold_or_busy(&mut lease, environment.as_str())?;
        slot.refresh().await?;

        slot.transition(EnvironmentEvent::Deploy)?;
        info!("Deploying {} to {}", version, environment);

        // The backup must exist before anything is overwritten
        let backup = if self.content.has_content(&slot.location).await {
            match self.take_backup(&mut slot).await {
                Ok(backup) => Some(backup),
                Err(e) => {
                    slot.transition(EnvironmentEvent::Revert(e.to_string()))?;
                    return Err(e);
                }
            }
        } else {
            None
        };

        if let Err(e) = self.content.write(&slot.location, &content).await {
            error!("Writing {} to {} failed: {}", version, environment, e);
            self.revert(&mut slot, backup.as_ref(), &e.to_string()).await?;
            let record = failed_record(environment, &version, DeploymentAction::Deploy, backup.as_ref(), e.to_string());
            self.finish(record, recorded).await?;
            return Err(e);
        }

        match self.verify(environment, &slot.location).await {
            HealthStatus::Healthy => {
                // Nothing is committed until the new version is on disk
                let previous = slot.active.clone();
                slot.mark_active(&version).await;
                if let Err(e) = slot.persist().await {
                    error!("Unable to record {} as live on {}: {}", version, environment, e);
                    slot.active = previous;
                    self.revert(&mut slot, backup.as_ref(), &e.to_string()).await?;
                    let record = failed_record(environment, &version, DeploymentAction::Deploy, backup.as_ref(), e.to_string());
                    self.finish(record, recorded).await?;
                    return Err(e);
                }
                slot.transition(EnvironmentEvent::Commit)?;

                info!("Deployed {} to {}", version, environment);
                let record = DeploymentRecord {
                    environment,
                    timestamp: Utc::now(),
                    version,
                    status: DeploymentStatus::Success,
                    action: DeploymentAction::Deploy,
                    backup_path: backup.map(|b| b.content_ref),
                    message: None,
                };
                self.finish(record, recorded).await
            }
            HealthStatus::Unhealthy(reason) => {
                warn!("{} failed its health check on {}: {}", version, environment, reason);
                self.revert(&mut slot, backup.as_ref(), &reason).await?;
                let record = failed_record(environment, &version, DeploymentAction::Deploy, backup.as_ref(), reason.clone());
                self.finish(record, recorded).await?;
                Err(DepotError::HealthCheckFailed {
                    environment: environment.to_string(),
                    reason,
                })
            }
        }
    }

    async fn deploy_blue_green(
        &self,
        content: PathBuf,
        version: String,
    ) -> Result<DeploymentRecord, DepotError> {
        let mut recorded = None;
        let result = self.attempt_blue_green(content, version, &mut recorded).await;
        if let Some(record) = &recorded {
            self.announce(record).await;
        }
        result
    }

    async fn attempt_blue_green(
        &self,
        content: PathBuf,
        version: String,
        recorded: &mut Option<DeploymentRecord>,
    ) -> Result<DeploymentRecord, DepotError> {
        self.slot(Environment::Blue)?;
        self.slot(Environment::Green)?;
        validate_release(&content, &version).await?;

        let mut alias = self
            .alias
            .try_lock()
            .map_err(|_| DepotError::EnvironmentBusy("blue-green".to_string()))?;
        let mut alias_lease = FileLock::open(&alias.lock_file).await?;
        let _alias_held = hold_or_busy(&mut alias_lease, "blue-green")?;
        alias.refresh().await?;

        let target = alias
            .live
            .and_then(|live| live.counterpart())
            .unwrap_or(Environment::Blue);

        let mut slot = self.acquire(target)?;
        let mut lease = slot.lease().await?;
        let _held = hold_or_busy(&mut lease, target.as_str())?;
        slot.refresh().await?;

        slot.transition(EnvironmentEvent::Deploy)?;
        info!("Deploying {} to inactive slot {}", version, target);

        if let Err(e) = self.content.write(&slot.location, &content).await {
            error!("Writing {} to {} failed: {}", version, target, e);
            self.discard_slot(&mut slot, &e.to_string()).await;
            let record = failed_record(target, &version, DeploymentAction::BlueGreen, None, e.to_string());
            self.finish(record, recorded).await?;
            return Err(e);
        }

        match self.verify(target, &slot.location).await {
            HealthStatus::Healthy => {
                slot.mark_active(&version).await;
                if let Err(e) = slot.persist().await {
                    error!("Unable to record {} on {}: {}", version, target, e);
                    self.discard_slot(&mut slot, &e.to_string()).await;
                    let record = failed_record(target, &version, DeploymentAction::BlueGreen, None, e.to_string());
                    self.finish(record, recorded).await?;
                    return Err(e);
                }
                slot.transition(EnvironmentEvent::Commit)?;

                if let Err(e) = alias.switch(target).await {
                    error!("{} is healthy on {} but the alias did not move: {}", version, target, e);
                    let record = failed_record(target, &version, DeploymentAction::BlueGreen, None, e.to_string());
                    self.finish(record, recorded).await?;
                    return Err(e);
                }

                info!("Switched live traffic to {} ({})", target, version);
                let record = DeploymentRecord {
                    environment: target,
                    timestamp: Utc::now(),
                    version,
                    status: DeploymentStatus::Success,
                    action: DeploymentAction::BlueGreen,
                    backup_path: None,
                    message: None,
                };
                self.finish(record, recorded).await
            }
            HealthStatus::Unhealthy(reason) => {
                warn!("{} failed its health check on {}: {}", version, target, reason);
                self.discard_slot(&mut slot, &reason).await;
                let record = failed_record(target, &version, DeploymentAction::BlueGreen, None, reason.clone());
                self.finish(record, recorded).await?;
                Err(DepotError::HealthCheckFailed {
                    environment: target.to_string(),
                    reason,
                })
            }
        }
    }

    /// Snapshot the slot's current content and apply retention
    async fn take_backup(&self, slot: &mut Slot) -> Result<Backup, DepotError> {
        let content_ref = self.content.snapshot(slot.environment, &slot.location).await?;
        let version = slot.active.as_ref().map(|a| a.version.clone());
        let (backup, evicted) = slot.backups.insert(Utc::now(), content_ref, version);

        for old in evicted {
            match self.content.discard(&old.content_ref).await {
                Ok(()) => debug!("Evicted backup {} of {}", old.content_ref.display(), slot.environment),
                Err(e) => warn!("Unable to delete evicted backup of {}: {}", slot.environment, e),
            }
        }

        slot.persist().await?;
        debug!("Backed up {} to {}", slot.environment, backup.content_ref.display());
        Ok(backup)
    }

    /// Put back the content that was live before the attempt
    async fn revert(&self, slot: &mut Slot, backup: Option<&Backup>, reason: &str) -> Result<(), DepotError> {
        let restored = match backup {
            Some(backup) => self.content.restore(&backup.content_ref, &slot.location).await,
            None => self.content.clear(&slot.location).await,
        };
        slot.transition(EnvironmentEvent::Revert(reason.to_string()))?;

        if let Err(e) = restored {
            error!("Unable to revert {}: {}", slot.environment, e);
            return Err(e);
        }
        Ok(())
    }

    /// Mark a blue-green slot as holding unusable content
    async fn discard_slot(&self, slot: &mut Slot, reason: &str) {
        slot.active = None;
        if let Err(e) = slot.transition(EnvironmentEvent::Discard(reason.to_string())) {
            error!("{}", e);
        }
        if let Err(e) = slot.persist().await {
            warn!("{}", e);
        }
    }

    /// Append the record to the deployment ledger.
    ///
    /// The record is kept in `recorded` and announced by the caller once the
    /// environment has been released.
    pub(crate) async fn finish(
        &self,
        record: DeploymentRecord,
        recorded: &mut Option<DeploymentRecord>,
    ) -> Result<DeploymentRecord, DepotError> {
        self.history.append(record.clone()).await?;
        *recorded = Some(record.clone());
        Ok(record)
    }

    /// Notify about a recorded attempt
    pub(crate) async fn announce(&self, record: &DeploymentRecord) {
        let message = match &record.message {
            Some(detail) => format!("{} of {} {}: {}", record.action, record.version, record.status, detail),
            None => format!("{} of {} {}", record.action, record.version, record.status),
        };
        self.notifier
            .notify(
                record.status.into(),
                message,
                format!("{}:{}", record.action, record.environment),
                None,
            )
            .await;
    }
}

pub(crate) fn failed_record(
    environment: Environment,
    version: &str,
    action: DeploymentAction,
    backup: Option<&Backup>,
    message: String,
) -> DeploymentRecord {
    DeploymentRecord {
        environment,
        timestamp: Utc::now(),
        version: version.to_string(),
        status: DeploymentStatus::Failed,
        action,
        backup_path: backup.map(|b| b.content_ref.clone()),
        message: Some(message),
    }
}

async fn validate_release(content: &Path, version: &str) -> Result<(), DepotError> {
    if !is_semver(version) {
        return Err(DepotError::ValidationError(format!(
            "version {} is not MAJOR.MINOR.PATCH",
            version
        )));
    }
    if !Dir::new(content).exists().await {
        return Err(DepotError::ValidationError(format!(
            "content directory {} does not exist",
            content.display()
        )));
    }
    Ok(())
}
