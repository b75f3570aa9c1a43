use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use tracing::{debug, error, info, instrument, warn};

use appointment_cell::{Appointment, AppointmentState, ClinicStore};
use shared_utils::{ClinicCalendar, Clock};

use crate::error::ReconcilerError;
use crate::models::{Notification, ReconcilerConfig, ScanReport};
use crate::services::notification::NotificationTransport;
use crate::services::runner::ReconcileTask;

/// Sends one reminder per booked appointment starting within the horizon.
pub struct ReminderDispatcher {
    store: Arc<dyn ClinicStore>,
    clock: Arc<dyn Clock>,
    calendar: ClinicCalendar,
    transport: Arc<dyn NotificationTransport>,
    horizon: Duration,
    sender: String,
    sms_gateway_domain: String,
}

impl ReminderDispatcher {
    pub fn new(
        state: &AppointmentState,
        config: &ReconcilerConfig,
        transport: Arc<dyn NotificationTransport>,
    ) -> Self {
        Self {
            store: Arc::clone(&state.store),
            clock: Arc::clone(&state.clock),
            calendar: state.calendar,
            transport,
            horizon: Duration::minutes(config.reminder_horizon_minutes),
            sender: config.notification_sender.clone(),
            sms_gateway_domain: config.sms_gateway_domain.clone(),
        }
    }

    #[instrument(skip(self))]
    pub async fn scan(&self) -> Result<ScanReport, ReconcilerError> {
        let now = self.clock.now();
        let candidates = self.store.list_reminder_candidates(now, now + self.horizon).await?;

        let mut report = ScanReport {
            scanned: candidates.len(),
            ..ScanReport::default()
        };

        for appointment in &candidates {
            // Step 1: Claim the marker so no other pass sends this reminder
            match self.store.claim_reminder(appointment.id, now).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!("Reminder for {} already claimed", appointment.id);
                    continue;
                }
                Err(e) => {
                    error!("Failed to claim reminder for {}: {}", appointment.id, e);
                    report.failed += 1;
                    continue;
                }
            }

            // Step 2: Resolve the contact and send, releasing the claim on failure
            match self.deliver(appointment).await {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    warn!("Reminder for appointment {} failed: {}", appointment.id, e);
                    report.failed += 1;
                    if let Err(release) = self.store.release_reminder(appointment.id).await {
                        error!("Failed to release reminder claim for {}: {}", appointment.id, release);
                    }
                }
            }
        }

        if report.applied > 0 {
            info!("Sent {} appointment reminders", report.applied);
        }
        Ok(report)
    }

    async fn deliver(&self, appointment: &Appointment) -> Result<(), ReconcilerError> {
        let phone = self
            .store
            .patient(appointment.patient_id)
            .await?
            .and_then(|patient| patient.phone)
            .map(|phone| phone.trim().to_string())
            .filter(|phone| !phone.is_empty())
            .ok_or(ReconcilerError::MissingContact(appointment.patient_id))?;

        let notification = self.compose(appointment, &phone);
        self.transport.send(&notification).await?;
        Ok(())
    }

    fn compose(&self, appointment: &Appointment, phone: &str) -> Notification {
        let local_time = appointment.appointment_time.with_timezone(&self.calendar.offset());
        Notification {
            from: self.sender.clone(),
            to: format!("{}@{}", phone, self.sms_gateway_domain),
            subject: "Appointment reminder".to_string(),
            body: format!(
                "Your {} appointment starts at {}",
                appointment.service_type,
                local_time.to_rfc3339()
            ),
        }
    }
}

#[async_trait]
impl ReconcileTask for ReminderDispatcher {
    fn name(&self) -> &'static str {
        "reminder dispatcher"
    }

    async fn run_once(&self) -> Result<ScanReport, ReconcilerError> {
        self.scan().await
    }
}
