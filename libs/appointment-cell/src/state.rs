// libs/appointment-cell/src/state.rs
use std::sync::Arc;

use chrono::NaiveTime;

use shared_config::AppConfig;
use shared_utils::time_window::parse_time_of_day;
use shared_utils::{ClinicCalendar, Clock, TimeWindowError};

use crate::store::ClinicStore;

/// Shared handles injected into every handler and service.
#[derive(Clone)]
pub struct AppointmentState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn ClinicStore>,
    pub clock: Arc<dyn Clock>,
    pub calendar: ClinicCalendar,
    pub morning_time: NaiveTime,
    pub afternoon_time: NaiveTime,
}

impl AppointmentState {
    pub fn new(
        config: Arc<AppConfig>,
        store: Arc<dyn ClinicStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TimeWindowError> {
        let calendar = ClinicCalendar::new(config.clinic_utc_offset_minutes)?;
        let morning_time = parse_time_of_day(&config.morning_session_time)?;
        let afternoon_time = parse_time_of_day(&config.afternoon_session_time)?;

        Ok(Self {
            config,
            store,
            clock,
            calendar,
            morning_time,
            afternoon_time,
        })
    }
}
