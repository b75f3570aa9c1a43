// libs/appointment-cell/src/services/queue.rs
use std::sync::Arc;

use chrono::Duration;
use tracing::debug;
use uuid::Uuid;

use shared_utils::{ClinicCalendar, Clock};

use crate::models::{AppointmentError, AppointmentStatus, LiveQueue};
use crate::state::AppointmentState;
use crate::store::ClinicStore;

/// Today's waiting room for one doctor.
pub struct QueueService {
    store: Arc<dyn ClinicStore>,
    clock: Arc<dyn Clock>,
    calendar: ClinicCalendar,
    consult_minutes: i64,
}

impl QueueService {
    pub fn new(state: &AppointmentState) -> Self {
        Self {
            store: Arc::clone(&state.store),
            clock: Arc::clone(&state.clock),
            calendar: state.calendar,
            consult_minutes: state.config.consult_minutes,
        }
    }

    pub async fn live_queue(&self, doctor_id: Uuid) -> Result<LiveQueue, AppointmentError> {
        let now = self.clock.now();
        let (day_start, _) = self.calendar.day_bounds(self.calendar.local_date(now));

        // The upper bound is exclusive, so reach one second past now.
        let entries: Vec<_> = self
            .store
            .list_for_doctor_between(doctor_id, day_start, now + Duration::seconds(1))
            .await?
            .into_iter()
            .filter(|a| a.status == AppointmentStatus::CheckedIn && a.appointment_time <= now)
            .collect();

        let waiting_count = entries.len();
        let estimated_wait_minutes = (waiting_count as i64 - 1).max(0) * self.consult_minutes;
        debug!("Doctor {} has {} patients waiting", doctor_id, waiting_count);

        Ok(LiveQueue {
            doctor_id,
            entries,
            waiting_count,
            estimated_wait_minutes,
        })
    }
}
