use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use tracing::{debug, error, info, instrument};

use appointment_cell::services::AppointmentLifecycleService;
use appointment_cell::{AppointmentError, AppointmentState, ClinicStore};
use shared_utils::Clock;

use crate::error::ReconcilerError;
use crate::models::ScanReport;
use crate::services::runner::ReconcileTask;

/// Marks booked appointments as `no_show` once they are past their grace period
/// without a check-in.
pub struct NoShowDetector {
    store: Arc<dyn ClinicStore>,
    clock: Arc<dyn Clock>,
    lifecycle: AppointmentLifecycleService,
    grace: Duration,
}

impl NoShowDetector {
    pub fn new(state: &AppointmentState, grace_minutes: i64) -> Self {
        Self {
            store: Arc::clone(&state.store),
            clock: Arc::clone(&state.clock),
            lifecycle: AppointmentLifecycleService::new(state),
            grace: Duration::minutes(grace_minutes),
        }
    }

    #[instrument(skip(self))]
    pub async fn scan(&self) -> Result<ScanReport, ReconcilerError> {
        let cutoff = self.clock.now() - self.grace;
        let candidates = self.store.list_booked_before(cutoff).await?;

        let mut report = ScanReport {
            scanned: candidates.len(),
            ..ScanReport::default()
        };

        for appointment in candidates {
            match self.lifecycle.mark_no_show(appointment.id).await {
                Ok(_) => report.applied += 1,
                // Checked in or cancelled since the query ran.
                Err(AppointmentError::InvalidTransition { from, .. }) => {
                    debug!("Appointment {} is now {}, leaving it", appointment.id, from);
                }
                Err(e) => {
                    error!("Failed to mark appointment {} as no-show: {}", appointment.id, e);
                    report.failed += 1;
                }
            }
        }

        if report.applied > 0 {
            info!("Marked {} appointments as no-show", report.applied);
        }
        Ok(report)
    }
}

#[async_trait]
impl ReconcileTask for NoShowDetector {
    fn name(&self) -> &'static str {
        "no-show detector"
    }

    async fn run_once(&self) -> Result<ScanReport, ReconcilerError> {
        self.scan().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appointment_cell::models::{Appointment, AppointmentStatus, ServiceType};
    use appointment_cell::store::AppointmentStore;
    use appointment_cell::InMemoryStore;
    use chrono::{DateTime, TimeZone, Utc};
    use shared_config::AppConfig;
    use shared_utils::FixedClock;
    use uuid::Uuid;

    fn booked_at(time: DateTime<Utc>) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            department_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            appointment_time: time,
            status: AppointmentStatus::Booked,
            service_type: ServiceType::Consult,
            check_in_time: None,
            reminder_sent_at: None,
            created_at: time,
            updated_at: time,
        }
    }

    #[tokio::test]
    async fn respects_grace_period_and_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        let slot = Utc.with_ymd_and_hms(2025, 6, 10, 9, 0, 0).unwrap();
        let appointment = booked_at(slot);
        store.seed_appointment(appointment.clone()).await;

        let clock = Arc::new(FixedClock::new(slot + Duration::minutes(5)));
        let state = AppointmentState::new(Arc::new(AppConfig::default()), store.clone(), clock.clone()).unwrap();
        let detector = NoShowDetector::new(&state, 15);

        let early = detector.scan().await.unwrap();
        assert_eq!(early, ScanReport::default());
        assert_eq!(store.get(appointment.id).await.unwrap().unwrap().status, AppointmentStatus::Booked);

        clock.set(slot + Duration::minutes(20));
        let report = detector.scan().await.unwrap();
        assert_eq!(report, ScanReport { scanned: 1, applied: 1, failed: 0 });
        assert_eq!(store.get(appointment.id).await.unwrap().unwrap().status, AppointmentStatus::NoShow);

        let again = detector.scan().await.unwrap();
        assert_eq!(again, ScanReport::default());
    }

    #[tokio::test]
    async fn checked_in_appointments_are_left_alone() {
        let store = Arc::new(InMemoryStore::new());
        let slot = Utc.with_ymd_and_hms(2025, 6, 10, 9, 0, 0).unwrap();
        let mut appointment = booked_at(slot);
        appointment.status = AppointmentStatus::CheckedIn;
        appointment.check_in_time = Some(slot - Duration::minutes(10));
        store.seed_appointment(appointment.clone()).await;

        let clock = Arc::new(FixedClock::new(slot + Duration::hours(2)));
        let state = AppointmentState::new(Arc::new(AppConfig::default()), store.clone(), clock).unwrap();

        let report = NoShowDetector::new(&state, 15).scan().await.unwrap();
        assert_eq!(report.applied, 0);
        assert_eq!(store.get(appointment.id).await.unwrap().unwrap().status, AppointmentStatus::CheckedIn);
    }
}
