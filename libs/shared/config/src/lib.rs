use std::env;
use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// How the booking engine treats doctors that have no published slots on a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotPolicy {
    /// Every booking must match a published schedule slot.
    Strict,
    /// Doctors without published slots on a date fall back to the fixed
    /// working-hours grid with a capacity of one per instant.
    Fallback,
}

impl FromStr for SlotPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(SlotPolicy::Strict),
            "fallback" | "fallback-grid" | "fallback_grid" => Ok(SlotPolicy::Fallback),
            other => Err(format!("unknown slot policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub database_timeout_secs: u64,
    pub bind_address: String,
    /// JSON file of doctors and patients loaded into the in-memory store.
    pub directory_seed_path: String,

    // Clinic calendar
    pub clinic_utc_offset_minutes: i32,
    pub clinic_opening_hour: u32,
    pub clinic_closing_hour: u32,
    pub consult_minutes: i64,
    pub default_slot_capacity: u32,
    pub morning_session_time: String,
    pub afternoon_session_time: String,
    pub slot_policy: SlotPolicy,

    // Background reconciler
    pub no_show_interval_secs: u64,
    pub no_show_grace_minutes: i64,
    pub reminder_interval_secs: u64,
    pub reminder_horizon_minutes: i64,

    // Notifications
    pub notification_webhook_url: String,
    pub notification_sender: String,
    pub sms_gateway_domain: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            database_timeout_secs: 10,
            bind_address: "0.0.0.0:3000".to_string(),
            directory_seed_path: String::new(),
            clinic_utc_offset_minutes: 0,
            clinic_opening_hour: 9,
            clinic_closing_hour: 17,
            consult_minutes: 15,
            default_slot_capacity: 5,
            morning_session_time: "09:00:00".to_string(),
            afternoon_session_time: "13:00:00".to_string(),
            slot_policy: SlotPolicy::Fallback,
            no_show_interval_secs: 900,
            no_show_grace_minutes: 15,
            reminder_interval_secs: 1800,
            reminder_horizon_minutes: 60,
            notification_webhook_url: String::new(),
            notification_sender: "noreply@clinic.com".to_string(),
            sms_gateway_domain: "sms.gateway.example.com".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            database_timeout_secs: env_parse("DATABASE_TIMEOUT_SECS", defaults.database_timeout_secs),
            bind_address: env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| defaults.bind_address.clone()),
            directory_seed_path: env::var("DIRECTORY_SEED_PATH").unwrap_or_default(),
            clinic_utc_offset_minutes: env_parse("CLINIC_UTC_OFFSET_MINUTES", defaults.clinic_utc_offset_minutes),
            clinic_opening_hour: env_parse("CLINIC_OPENING_HOUR", defaults.clinic_opening_hour),
            clinic_closing_hour: env_parse("CLINIC_CLOSING_HOUR", defaults.clinic_closing_hour),
            consult_minutes: env_parse("CONSULT_MINUTES", defaults.consult_minutes),
            default_slot_capacity: env_parse("DEFAULT_SLOT_CAPACITY", defaults.default_slot_capacity),
            morning_session_time: env::var("MORNING_SESSION_TIME")
                .unwrap_or_else(|_| defaults.morning_session_time.clone()),
            afternoon_session_time: env::var("AFTERNOON_SESSION_TIME")
                .unwrap_or_else(|_| defaults.afternoon_session_time.clone()),
            slot_policy: env_parse("SLOT_POLICY", defaults.slot_policy),
            no_show_interval_secs: env_parse("NO_SHOW_INTERVAL_SECS", defaults.no_show_interval_secs),
            no_show_grace_minutes: env_parse("NO_SHOW_GRACE_MINUTES", defaults.no_show_grace_minutes),
            reminder_interval_secs: env_parse("REMINDER_INTERVAL_SECS", defaults.reminder_interval_secs),
            reminder_horizon_minutes: env_parse("REMINDER_HORIZON_MINUTES", defaults.reminder_horizon_minutes),
            notification_webhook_url: env::var("NOTIFICATION_WEBHOOK_URL")
                .unwrap_or_else(|_| {
                    warn!("NOTIFICATION_WEBHOOK_URL not set, reminders will only be logged");
                    String::new()
                }),
            notification_sender: env::var("NOTIFICATION_SENDER")
                .unwrap_or_else(|_| defaults.notification_sender.clone()),
            sms_gateway_domain: env::var("SMS_GATEWAY_DOMAIN")
                .unwrap_or_else(|_| defaults.sms_gateway_domain.clone()),
        };

        if !config.is_database_configured() {
            warn!("Supabase not configured - falling back to the in-memory store");
        }

        if !config.is_database_configured() && config.directory_seed_path.is_empty() {
            warn!("DIRECTORY_SEED_PATH not set, the in-memory directory starts empty and every booking will be refused");
        }

        if config.clinic_opening_hour >= config.clinic_closing_hour {
            warn!(
                "Clinic opening hour {} is not before closing hour {}, the fallback grid will be empty",
                config.clinic_opening_hour, config.clinic_closing_hour
            );
        }

        config
    }

    pub fn is_database_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
    }

    pub fn is_notification_webhook_configured(&self) -> bool {
        !self.notification_webhook_url.is_empty()
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(value) => value,
            Err(e) => {
                warn!("{} has invalid value '{}' ({}), using default {}", key, raw, e, default);
                default
            }
        },
        Err(_) => default,
    }
}

impl Display for SlotPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotPolicy::Strict => write!(f, "strict"),
            SlotPolicy::Fallback => write!(f, "fallback"),
        }
    }
}
