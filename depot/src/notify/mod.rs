//! Best-effort status notifications
//!
//! Delivery failures are logged and never returned to the caller, so a broken
//! channel cannot fail a build or a deployment.

pub mod channels;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::DepotError;
use crate::models::build::BuildStatus;
use crate::models::deployment::DeploymentStatus;

pub use channels::{ConsoleChannel, LogFileChannel, WebhookChannel};

/// Terminal status carried by a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyStatus {
    Success,
    Failure,
    Unstable,
    Unknown,
}

impl NotifyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyStatus::Success => "success",
            NotifyStatus::Failure => "failure",
            NotifyStatus::Unstable => "unstable",
            NotifyStatus::Unknown => "unknown",
        }
    }
}

impl From<BuildStatus> for NotifyStatus {
    fn from(status: BuildStatus) -> Self {
        match status {
            BuildStatus::Success => NotifyStatus::Success,
            BuildStatus::Failure => NotifyStatus::Failure,
            BuildStatus::Unstable => NotifyStatus::Unstable,
            BuildStatus::Unknown => NotifyStatus::Unknown,
        }
    }
}

impl From<DeploymentStatus> for NotifyStatus {
    fn from(status: DeploymentStatus) -> Self {
        match status {
            DeploymentStatus::Success => NotifyStatus::Success,
            DeploymentStatus::Failed => NotifyStatus::Failure,
        }
    }
}

/// A single status message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub status: NotifyStatus,
    pub message: String,
    pub job_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_number: Option<u64>,

    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// One-line human readable form
    pub fn headline(&self) -> String {
        match self.build_number {
            Some(n) => format!("[{}] {} #{}: {}", self.status.as_str().to_uppercase(), self.job_name, n, self.message),
            None => format!("[{}] {}: {}", self.status.as_str().to_uppercase(), self.job_name, self.message),
        }
    }
}

/// A destination for notifications
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, notification: &Notification) -> Result<(), DepotError>;
}

/// Fans notifications out to every configured channel
#[derive(Default)]
pub struct Notifier {
    channels: Vec<Box<dyn Channel>>,
}

impl Notifier {
    pub fn new(channels: Vec<Box<dyn Channel>>) -> Self {
        Self { channels }
    }

    /// A notifier with no channels
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, channel: Box<dyn Channel>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Deliver to every channel; failures are logged and dropped
    pub async fn notify(
        &self,
        status: NotifyStatus,
        message: impl Into<String>,
        job_name: impl Into<String>,
        build_number: Option<u64>,
    ) {
        let notification = Notification {
            status,
            message: message.into(),
            job_name: job_name.into(),
            build_number,
            timestamp: Utc::now(),
        };

        for channel in &self.channels {
            if let Err(e) = channel.deliver(&notification).await {
                warn!("Notification via {} not delivered: {}", channel.name(), e);
            }
        }
    }
}
