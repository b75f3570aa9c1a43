use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, warn};

use shared_config::AppConfig;

use crate::error::NotificationError;
use crate::models::Notification;

#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotificationError>;
}

/// Posts each notification as JSON to a gateway webhook.
pub struct WebhookTransport {
    client: Client,
    url: String,
}

impl WebhookTransport {
    pub fn new(url: &str, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build webhook client with timeout ({}), using defaults", e);
                Client::new()
            });

        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl NotificationTransport for WebhookTransport {
    async fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
        debug!("Posting notification for {} to {}", notification.to, self.url);

        let response = self.client.post(&self.url).json(notification).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// Writes notifications to the log only.
#[derive(Debug, Default)]
pub struct LogTransport;

#[async_trait]
impl NotificationTransport for LogTransport {
    async fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
        info!(
            to = %notification.to,
            subject = %notification.subject,
            "Notification (log only): {}",
            notification.body
        );
        Ok(())
    }
}

pub fn transport_from_config(config: &AppConfig) -> Arc<dyn NotificationTransport> {
    if config.is_notification_webhook_configured() {
        info!("Reminders will be posted to {}", config.notification_webhook_url);
        Arc::new(WebhookTransport::new(&config.notification_webhook_url, config.database_timeout_secs))
    } else {
        warn!("No notification webhook configured, reminders will only be logged");
        Arc::new(LogTransport)
    }
}
