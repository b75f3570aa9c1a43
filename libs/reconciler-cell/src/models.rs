use std::time::Duration;

use serde::{Deserialize, Serialize};

use shared_config::AppConfig;

/// Outcome of one pass over the appointment store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    /// Candidates returned by the store query.
    pub scanned: usize,
    /// Candidates that were transitioned or notified.
    pub applied: usize,
    /// Candidates whose processing errored. Never aborts the pass.
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    pub no_show_interval: Duration,
    pub no_show_grace_minutes: i64,
    pub reminder_interval: Duration,
    pub reminder_horizon_minutes: i64,
    pub notification_sender: String,
    pub sms_gateway_domain: String,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ReconcilerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            no_show_interval: Duration::from_secs(config.no_show_interval_secs.max(1)),
            no_show_grace_minutes: config.no_show_grace_minutes,
            reminder_interval: Duration::from_secs(config.reminder_interval_secs.max(1)),
            reminder_horizon_minutes: config.reminder_horizon_minutes,
            notification_sender: config.notification_sender.clone(),
            sms_gateway_domain: config.sms_gateway_domain.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}
