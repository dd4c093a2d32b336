//! Notification channels

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

use crate::errors::DepotError;
use crate::filesys::file::File;
use crate::notify::{Channel, Notification, NotifyStatus};

/// Emits notifications as tracing events
#[derive(Debug, Default, Clone)]
pub struct ConsoleChannel;

#[async_trait]
impl Channel for ConsoleChannel {
    fn name(&self) -> &str {
        "console"
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), DepotError> {
        match notification.status {
            NotifyStatus::Success => info!("{}", notification.headline()),
            _ => warn!("{}", notification.headline()),
        }
        Ok(())
    }
}

/// Appends notifications to a JSON-lines file
#[derive(Debug, Clone)]
pub struct LogFileChannel {
    file: File,
}

impl LogFileChannel {
    pub fn new(file: File) -> Self {
        Self { file }
    }
}

#[async_trait]
impl Channel for LogFileChannel {
    fn name(&self) -> &str {
        "log_file"
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), DepotError> {
        self.file.append_json_line(notification).await
    }
}

/// Chat-style webhook payload
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    text: String,
    status: &'a str,
    job_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    build_number: Option<u64>,
    message: &'a str,
    timestamp: String,
}

/// Posts notifications as JSON to a webhook URL
pub struct WebhookChannel {
    client: Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, DepotError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), DepotError> {
        let payload = WebhookPayload {
            text: notification.headline(),
            status: notification.status.as_str(),
            job_name: &notification.job_name,
            build_number: notification.build_number,
            message: &notification.message,
            timestamp: notification.timestamp.to_rfc3339(),
        };

        let response = self.client.post(&self.url).json(&payload).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DepotError::NotifyError(format!("{}: {}", status, body)));
        }

        Ok(())
    }
}
