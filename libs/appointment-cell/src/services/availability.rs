// libs/appointment-cell/src/services/availability.rs
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use shared_config::{AppConfig, SlotPolicy};
use shared_utils::time_window::parse_date;
use shared_utils::ClinicCalendar;

use crate::models::{AppointmentError, AvailableSlot, Doctor, SlotSource};
use crate::state::AppointmentState;
use crate::store::ClinicStore;

pub struct AvailabilityService {
    store: Arc<dyn ClinicStore>,
    calendar: ClinicCalendar,
    config: Arc<AppConfig>,
}

impl AvailabilityService {
    pub fn new(state: &AppointmentState) -> Self {
        Self {
            store: Arc::clone(&state.store),
            calendar: state.calendar,
            config: Arc::clone(&state.config),
        }
    }

    /// Bookable instants for the doctor on a clinic-local date, with current load.
    #[instrument(skip(self))]
    pub async fn available_slots(&self, doctor_id: Uuid, date: &str) -> Result<Vec<AvailableSlot>, AppointmentError> {
        let date = parse_date(date).map_err(|e| AppointmentError::ValidationError(e.to_string()))?;

        let (day_start, day_end) = self.calendar.day_bounds(date);
        let load = self.load_by_instant(doctor_id, day_start, day_end).await?;
        let count_at = |instant: &DateTime<Utc>| load.get(instant).copied().unwrap_or(0);

        let slots = self.store.slots_for_day(doctor_id, date).await?;

        if !slots.is_empty() {
            let mut published: Vec<AvailableSlot> = slots
                .iter()
                .map(|slot| {
                    let instant = self.calendar.to_instant(slot.slot_date, slot.slot_time);
                    AvailableSlot {
                        slot: instant,
                        count: count_at(&instant),
                        capacity: slot.capacity,
                        source: SlotSource::Published,
                    }
                })
                .collect();
            published.sort_by_key(|s| s.slot);
            return Ok(published);
        }

        match self.config.slot_policy {
            SlotPolicy::Strict => {
                debug!("No slots for doctor {} on {}", doctor_id, date);
                Ok(Vec::new())
            }
            SlotPolicy::Fallback => {
                if self.store.has_published_schedule(doctor_id).await? {
                    debug!("Doctor {} publishes a schedule and is off on {}", doctor_id, date);
                    return Ok(Vec::new());
                }
                Ok(self.grid_slots(date, &count_at))
            }
        }
    }

    fn grid_slots(&self, date: NaiveDate, count_at: &dyn Fn(&DateTime<Utc>) -> u32) -> Vec<AvailableSlot> {
        self.calendar
            .hourly_grid(date, self.config.clinic_opening_hour, self.config.clinic_closing_hour)
            .into_iter()
            .map(|instant| AvailableSlot {
                slot: instant,
                count: count_at(&instant),
                capacity: 1,
                source: SlotSource::Grid,
            })
            .collect()
    }

    async fn load_by_instant(
        &self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<HashMap<DateTime<Utc>, u32>, AppointmentError> {
        let appointments = self.store.list_for_doctor_between(doctor_id, start, end).await?;

        let mut load = HashMap::new();
        for appointment in appointments.iter().filter(|a| a.occupies_slot()) {
            *load.entry(appointment.appointment_time).or_insert(0) += 1;
        }
        Ok(load)
    }

    /// Doctors with at least one published slot on the date.
    #[instrument(skip(self))]
    pub async fn available_doctors(&self, date: &str) -> Result<Vec<Doctor>, AppointmentError> {
        let date = parse_date(date).map_err(|e| AppointmentError::ValidationError(e.to_string()))?;

        let mut doctors = Vec::new();
        for doctor_id in self.store.doctors_with_slots_on(date).await? {
            match self.store.doctor(doctor_id).await? {
                Some(doctor) if doctor.is_active => doctors.push(doctor),
                Some(_) => debug!("Doctor {} is inactive, skipping", doctor_id),
                None => warn!("Doctor {} has slots on {} but is missing from the directory", doctor_id, date),
            }
        }

        doctors.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(doctors)
    }
}
