// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_config::SlotPolicy;
use shared_utils::time_window::parse_date;
use shared_utils::{ClinicCalendar, Clock};

use crate::models::{
    Appointment, AppointmentError, AppointmentListQuery, AppointmentStatus, CreateAppointmentRequest, ServiceType,
};
use crate::state::AppointmentState;
use crate::store::{AppointmentFilter, CapacityRule, ClinicStore};

pub struct AppointmentBookingService {
    store: Arc<dyn ClinicStore>,
    clock: Arc<dyn Clock>,
    calendar: ClinicCalendar,
    policy: SlotPolicy,
}

impl AppointmentBookingService {
    pub fn new(state: &AppointmentState) -> Self {
        Self {
            store: Arc::clone(&state.store),
            clock: Arc::clone(&state.clock),
            calendar: state.calendar,
            policy: state.config.slot_policy,
        }
    }

    #[instrument(skip(self, request), fields(doctor_id = %request.doctor_id, patient_id = %request.patient_id))]
    pub async fn create_appointment(&self, request: CreateAppointmentRequest) -> Result<Appointment, AppointmentError> {
        let now = self.clock.now();

        // Step 1: Reject past and present instants
        if request.appointment_time <= now {
            warn!("Rejected booking at {} (now is {})", request.appointment_time, now);
            return Err(AppointmentError::InvalidTime(format!(
                "appointment time {} is not in the future",
                request.appointment_time.to_rfc3339()
            )));
        }

        if request.service_type.trim().is_empty() {
            return Err(AppointmentError::ValidationError("service_type is required".to_string()));
        }

        // Step 2: Both parties must exist in the directory
        self.check_parties(&request).await?;

        // Step 3: Decide which capacity governs the (doctor, instant) key
        let rule = self.capacity_rule(request.doctor_id, request.appointment_time).await?;
        debug!("Capacity rule {:?} for doctor {}", rule, request.doctor_id);

        // Step 4: The store reads the capacity, counts and inserts atomically
        let appointment = Appointment {
            id: Uuid::new_v4(),
            department_id: request.department_id,
            doctor_id: request.doctor_id,
            patient_id: request.patient_id,
            appointment_time: request.appointment_time,
            status: AppointmentStatus::Booked,
            service_type: ServiceType::from(request.service_type),
            check_in_time: None,
            reminder_sent_at: None,
            created_at: now,
            updated_at: now,
        };

        let stored = self
            .store
            .insert_within_capacity(appointment, rule)
            .await
            .map_err(|e| {
                warn!("Booking for doctor {} at {} refused: {}", request.doctor_id, request.appointment_time, e);
                AppointmentError::from(e)
            })?;

        info!(
            "Appointment {} booked with doctor {} at {}",
            stored.id, stored.doctor_id, stored.appointment_time
        );
        Ok(stored)
    }

    async fn check_parties(&self, request: &CreateAppointmentRequest) -> Result<(), AppointmentError> {
        let doctor = match self.store.doctor(request.doctor_id).await? {
            Some(doctor) if doctor.is_active => doctor,
            _ => {
                warn!("Booking names unknown or inactive doctor {}", request.doctor_id);
                return Err(AppointmentError::DoctorNotFound(request.doctor_id));
            }
        };

        if let Some(department_id) = doctor.department_id {
            if department_id != request.department_id {
                return Err(AppointmentError::ValidationError(format!(
                    "doctor {} does not belong to department {}",
                    doctor.id, request.department_id
                )));
            }
        }

        if self.store.patient(request.patient_id).await?.is_none() {
            warn!("Booking names unknown patient {}", request.patient_id);
            return Err(AppointmentError::PatientNotFound(request.patient_id));
        }

        Ok(())
    }

    /// Published slot at the exact local time if the doctor published that day.
    /// A doctor with no slot that day is bookable on the grid only under the
    /// fallback policy and only if they have never published a schedule.
    pub async fn capacity_rule(&self, doctor_id: Uuid, time: DateTime<Utc>) -> Result<CapacityRule, AppointmentError> {
        let date = self.calendar.local_date(time);
        let local_time = self.calendar.local_time(time);

        let slots = self.store.slots_for_day(doctor_id, date).await?;
        if !slots.is_empty() {
            return slots
                .iter()
                .find(|slot| slot.slot_time == local_time)
                .map(|_| CapacityRule::PublishedSlot { date, time: local_time })
                .ok_or(AppointmentError::NoSuchSlot);
        }

        match self.policy {
            SlotPolicy::Strict => Err(AppointmentError::NoSuchSlot),
            SlotPolicy::Fallback => {
                if self.store.has_published_schedule(doctor_id).await? {
                    debug!("Doctor {} publishes a schedule but has no slots on {}", doctor_id, date);
                    return Err(AppointmentError::NoSuchSlot);
                }
                debug!("Doctor {} has never published slots, using the fixed grid", doctor_id);
                Ok(CapacityRule::Grid)
            }
        }
    }

    pub async fn get_appointment(&self, id: Uuid) -> Result<Appointment, AppointmentError> {
        self.store.get(id).await?.ok_or(AppointmentError::NotFound)
    }

    pub async fn appointments_for_patient(&self, patient_id: Uuid) -> Result<Vec<Appointment>, AppointmentError> {
        Ok(self.store.list_for_patient(patient_id).await?)
    }

    pub async fn appointments_for_doctor(&self, doctor_id: Uuid) -> Result<Vec<Appointment>, AppointmentError> {
        Ok(self.store.list_for_doctor(doctor_id).await?)
    }

    /// Appointments matching every given filter; `date` is a clinic-local day.
    pub async fn list_appointments(&self, query: AppointmentListQuery) -> Result<Vec<Appointment>, AppointmentError> {
        let mut filter = AppointmentFilter {
            department_id: query.department_id,
            doctor_id: query.doctor_id,
            ..AppointmentFilter::default()
        };

        if let Some(date) = query.date.as_deref() {
            let date = parse_date(date).map_err(|e| AppointmentError::ValidationError(e.to_string()))?;
            let (start, end) = self.calendar.day_bounds(date);
            filter.start = Some(start);
            filter.end = Some(end);
        }
        if let Some(status) = query.status.as_deref() {
            filter.status = Some(status.parse()?);
        }

        Ok(self.store.list_matching(&filter).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Doctor, Patient, ScheduleSlot};
    use crate::store::{AppointmentStore, InMemoryStore};
    use assert_matches::assert_matches;
    use chrono::{Duration, NaiveDate, NaiveTime, TimeZone};
    use shared_config::AppConfig;
    use shared_utils::FixedClock;

    struct Fixture {
        store: Arc<InMemoryStore>,
        service: AppointmentBookingService,
        department: Uuid,
        patient: Uuid,
    }

    async fn fixture(policy: SlotPolicy) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let patient = Uuid::new_v4();
        store
            .upsert_patient(Patient {
                id: patient,
                name: "Chen Mei".to_string(),
                phone: Some("0912345678".to_string()),
            })
            .await;

        let config = AppConfig {
            slot_policy: policy,
            ..AppConfig::default()
        };
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2025, 6, 10, 8, 0, 0).unwrap()));
        let state = AppointmentState::new(Arc::new(config), store.clone(), clock).unwrap();

        Fixture {
            service: AppointmentBookingService::new(&state),
            store,
            department: Uuid::new_v4(),
            patient,
        }
    }

    impl Fixture {
        async fn doctor(&self) -> Uuid {
            let id = Uuid::new_v4();
            self.store
                .upsert_doctor(Doctor {
                    id,
                    department_id: Some(self.department),
                    name: format!("Dr. {}", &id.to_string()[..4]),
                    is_active: true,
                })
                .await;
            id
        }

        fn request(&self, doctor_id: Uuid, time: DateTime<Utc>) -> CreateAppointmentRequest {
            CreateAppointmentRequest {
                department_id: self.department,
                doctor_id,
                patient_id: self.patient,
                appointment_time: time,
                service_type: "consult".to_string(),
            }
        }

        async fn publish(&self, doctor_id: Uuid, date: NaiveDate, capacity: u32) {
            self.store
                .seed_slots(vec![ScheduleSlot {
                    id: Uuid::new_v4(),
                    doctor_id,
                    department_id: Some(self.department),
                    slot_date: date,
                    slot_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                    capacity,
                }])
                .await;
        }
    }

    fn nine_am() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, 9, 0, 0).unwrap()
    }

    fn june(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    #[tokio::test]
    async fn rejects_time_that_is_not_in_the_future() {
        let f = fixture(SlotPolicy::Fallback).await;
        let doctor = f.doctor().await;
        let now = Utc.with_ymd_and_hms(2025, 6, 10, 8, 0, 0).unwrap();

        assert_matches!(
            f.service.create_appointment(f.request(doctor, now)).await,
            Err(AppointmentError::InvalidTime(_))
        );
        assert_matches!(
            f.service.create_appointment(f.request(doctor, now - Duration::hours(1))).await,
            Err(AppointmentError::InvalidTime(_))
        );
    }

    #[tokio::test]
    async fn rejects_blank_service_type() {
        let f = fixture(SlotPolicy::Fallback).await;
        let mut req = f.request(f.doctor().await, nine_am());
        req.service_type = "   ".to_string();

        assert_matches!(f.service.create_appointment(req).await, Err(AppointmentError::ValidationError(_)));
    }

    #[tokio::test]
    async fn unknown_parties_are_not_found() {
        let f = fixture(SlotPolicy::Fallback).await;
        let ghost = Uuid::new_v4();
        assert_matches!(
            f.service.create_appointment(f.request(ghost, nine_am())).await,
            Err(AppointmentError::DoctorNotFound(id)) if id == ghost
        );

        let doctor = f.doctor().await;
        let mut req = f.request(doctor, nine_am());
        req.patient_id = Uuid::new_v4();
        assert_matches!(f.service.create_appointment(req).await, Err(AppointmentError::PatientNotFound(_)));

        // Nothing was written for the rejected requests.
        assert!(f.store.list_for_doctor(doctor).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn inactive_or_foreign_doctor_is_refused() {
        let f = fixture(SlotPolicy::Fallback).await;
        let retired = Uuid::new_v4();
        f.store
            .upsert_doctor(Doctor {
                id: retired,
                department_id: Some(f.department),
                name: "Dr. Retired".to_string(),
                is_active: false,
            })
            .await;
        assert_matches!(
            f.service.create_appointment(f.request(retired, nine_am())).await,
            Err(AppointmentError::DoctorNotFound(_))
        );

        let mut req = f.request(f.doctor().await, nine_am());
        req.department_id = Uuid::new_v4();
        assert_matches!(f.service.create_appointment(req).await, Err(AppointmentError::ValidationError(_)));
    }

    #[tokio::test]
    async fn grid_mode_allows_one_booking_per_instant() {
        let f = fixture(SlotPolicy::Fallback).await;
        let doctor = f.doctor().await;

        let first = f.service.create_appointment(f.request(doctor, nine_am())).await.unwrap();
        assert_eq!(first.status, AppointmentStatus::Booked);
        assert_matches!(
            f.service.create_appointment(f.request(doctor, nine_am())).await,
            Err(AppointmentError::SlotTaken)
        );

        // Same instant, different doctor: independent key.
        let other = f.doctor().await;
        assert!(f.service.create_appointment(f.request(other, nine_am())).await.is_ok());
    }

    #[tokio::test]
    async fn published_slot_capacity_applies() {
        let f = fixture(SlotPolicy::Fallback).await;
        let doctor = f.doctor().await;
        f.publish(doctor, june(10), 2).await;

        f.service.create_appointment(f.request(doctor, nine_am())).await.unwrap();
        f.service.create_appointment(f.request(doctor, nine_am())).await.unwrap();
        assert_matches!(
            f.service.create_appointment(f.request(doctor, nine_am())).await,
            Err(AppointmentError::SlotTaken)
        );

        // Published day: off-slot times do not exist.
        assert_matches!(
            f.service
                .create_appointment(f.request(doctor, nine_am() + Duration::minutes(30)))
                .await,
            Err(AppointmentError::NoSuchSlot)
        );
    }

    #[tokio::test]
    async fn doctor_with_a_schedule_is_off_on_unpublished_days() {
        let f = fixture(SlotPolicy::Fallback).await;
        let doctor = f.doctor().await;
        f.publish(doctor, june(10), 3).await;

        let next_day = nine_am() + Duration::days(1);
        assert_matches!(
            f.service.create_appointment(f.request(doctor, next_day)).await,
            Err(AppointmentError::NoSuchSlot)
        );
        assert_eq!(
            f.service.capacity_rule(doctor, nine_am()).await,
            Ok(CapacityRule::PublishedSlot {
                date: june(10),
                time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            })
        );

        // A doctor who never published stays on the grid that day.
        let unscheduled = f.doctor().await;
        assert_eq!(f.service.capacity_rule(unscheduled, next_day).await, Ok(CapacityRule::Grid));
    }

    #[tokio::test]
    async fn strict_policy_requires_a_slot() {
        let f = fixture(SlotPolicy::Strict).await;
        let doctor = f.doctor().await;

        assert_matches!(
            f.service.create_appointment(f.request(doctor, nine_am())).await,
            Err(AppointmentError::NoSuchSlot)
        );
    }

    #[tokio::test]
    async fn lists_appointments_with_optional_filters() {
        let f = fixture(SlotPolicy::Fallback).await;
        let first = f.doctor().await;
        let second = f.doctor().await;
        f.service.create_appointment(f.request(first, nine_am())).await.unwrap();
        f.service
            .create_appointment(f.request(second, nine_am() + Duration::days(1)))
            .await
            .unwrap();
        let cancelled = f
            .service
            .create_appointment(f.request(second, nine_am() + Duration::hours(1)))
            .await
            .unwrap();
        f.store
            .seed_appointment(Appointment {
                status: AppointmentStatus::Cancelled,
                ..cancelled
            })
            .await;

        let all = f.service.list_appointments(AppointmentListQuery::default()).await.unwrap();
        assert_eq!(all.len(), 3);

        let on_tenth = AppointmentListQuery {
            date: Some("2025-06-10".to_string()),
            ..AppointmentListQuery::default()
        };
        assert_eq!(f.service.list_appointments(on_tenth).await.unwrap().len(), 2);

        let booked_for_second = AppointmentListQuery {
            doctor_id: Some(second),
            status: Some("booked".to_string()),
            department_id: Some(f.department),
            ..AppointmentListQuery::default()
        };
        let rows = f.service.list_appointments(booked_for_second).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].appointment_time, nine_am() + Duration::days(1));

        let bad_date = AppointmentListQuery {
            date: Some("June 10".to_string()),
            ..AppointmentListQuery::default()
        };
        assert_matches!(f.service.list_appointments(bad_date).await, Err(AppointmentError::ValidationError(_)));

        let bad_status = AppointmentListQuery {
            status: Some("postponed".to_string()),
            ..AppointmentListQuery::default()
        };
        assert_matches!(f.service.list_appointments(bad_status).await, Err(AppointmentError::InvalidStatus(_)));
    }
}
