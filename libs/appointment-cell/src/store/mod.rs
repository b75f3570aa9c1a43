// libs/appointment-cell/src/store/mod.rs
//! Persistence seams for the booking core.
//!
//! Every component receives the same `Arc<dyn ClinicStore>` built at startup.
//! Implementations must make `insert_within_capacity`, `reassign_within_capacity`,
//! `transition` and `claim_reminder` atomic with respect to each other.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use shared_utils::YearMonth;

use crate::models::{Appointment, AppointmentStatus, Doctor, DoctorLeave, Patient, ScheduleSlot};

pub mod memory;
pub mod supabase;

pub use memory::InMemoryStore;
pub use supabase::SupabaseStore;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The (doctor, instant) key already holds `capacity` active appointments.
    #[error("capacity exceeded for the requested slot")]
    CapacityExceeded,

    /// The published slot named by a `CapacityRule` no longer exists.
    #[error("no published slot for the requested time")]
    NoSuchSlot,

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("failed to decode store row: {0}")]
    Decode(String),
}

/// Where the capacity of a (doctor, instant) key comes from. The store reads
/// the figure under the same lock as the occupancy count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityRule {
    /// The doctor's published slot at this clinic-local date and time.
    PublishedSlot { date: NaiveDate, time: NaiveTime },
    /// Doctor has never published a schedule; one booking per exact instant.
    Grid,
}

impl CapacityRule {
    pub const GRID_CAPACITY: u32 = 1;
}

/// A compare-and-set status change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusChange {
    pub from: AppointmentStatus,
    pub to: AppointmentStatus,
    pub at: DateTime<Utc>,
    /// Record `at` as the check-in time.
    pub check_in: bool,
}

/// Moves a booked appointment from one doctor to another.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reassignment {
    pub from_doctor: Uuid,
    pub to_doctor: Uuid,
    pub rule: CapacityRule,
    pub at: DateTime<Utc>,
}

/// Listing filter. `None` fields match everything; the time range is half-open.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppointmentFilter {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub department_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
}

impl AppointmentFilter {
    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.start.map_or(true, |start| appointment.appointment_time >= start)
            && self.end.map_or(true, |end| appointment.appointment_time < end)
            && self.department_id.map_or(true, |id| appointment.department_id == id)
            && self.doctor_id.map_or(true, |id| appointment.doctor_id == id)
            && self.status.map_or(true, |status| appointment.status == status)
    }
}

#[async_trait]
pub trait ScheduleSlotStore: Send + Sync {
    async fn slots_for_day(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<ScheduleSlot>, StoreError>;

    async fn slots_for_month(&self, doctor_id: Uuid, month: YearMonth) -> Result<Vec<ScheduleSlot>, StoreError>;

    /// Slots of every doctor with `from <= date <= to`.
    async fn slots_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<ScheduleSlot>, StoreError>;

    /// Distinct dates carrying at least one slot, ascending.
    async fn published_dates(&self) -> Result<Vec<NaiveDate>, StoreError>;

    /// Whether the doctor has ever had a slot published.
    async fn has_published_schedule(&self, doctor_id: Uuid) -> Result<bool, StoreError>;

    /// Distinct doctors with at least one slot on `date`.
    async fn doctors_with_slots_on(&self, date: NaiveDate) -> Result<Vec<Uuid>, StoreError>;

    /// Drops every slot of the doctor in `month` and stores `slots` in their place.
    async fn replace_month(
        &self,
        doctor_id: Uuid,
        month: YearMonth,
        slots: Vec<ScheduleSlot>,
    ) -> Result<Vec<ScheduleSlot>, StoreError>;
}

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Inserts `appointment` only if fewer than the capacity given by `rule`
    /// non-cancelled appointments exist for its doctor at its exact instant.
    async fn insert_within_capacity(&self, appointment: Appointment, rule: CapacityRule)
        -> Result<Appointment, StoreError>;

    /// Moves a still-booked appointment of `from_doctor` to `to_doctor` if the
    /// target key has room under `rule`. `None` means the row no longer matched.
    async fn reassign_within_capacity(
        &self,
        id: Uuid,
        change: Reassignment,
    ) -> Result<Option<Appointment>, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, StoreError>;

    async fn list_for_patient(&self, patient_id: Uuid) -> Result<Vec<Appointment>, StoreError>;

    async fn list_for_doctor(&self, doctor_id: Uuid) -> Result<Vec<Appointment>, StoreError>;

    /// Appointments of the doctor with `start <= time < end`.
    async fn list_for_doctor_between(
        &self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, StoreError>;

    async fn list_matching(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError>;

    /// Booked appointments whose time is strictly before `cutoff` and that were never checked in.
    async fn list_booked_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Appointment>, StoreError>;

    /// Booked appointments with `from <= time <= to` and no reminder claimed.
    async fn list_reminder_candidates(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, StoreError>;

    /// Applies `change` only if the stored status still equals `change.from`.
    /// `None` means no row matched (missing or already moved on).
    async fn transition(&self, id: Uuid, change: StatusChange) -> Result<Option<Appointment>, StoreError>;

    /// Sets `reminder_sent_at` if it is unset and the appointment is still booked.
    /// Returns whether this caller won the claim.
    async fn claim_reminder(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError>;

    async fn release_reminder(&self, id: Uuid) -> Result<(), StoreError>;
}

#[async_trait]
pub trait DoctorDirectory: Send + Sync {
    async fn doctor(&self, id: Uuid) -> Result<Option<Doctor>, StoreError>;

    /// Doctors of the department ordered by name, inactive ones included.
    async fn doctors_in_department(&self, department_id: Uuid) -> Result<Vec<Doctor>, StoreError>;
}

#[async_trait]
pub trait PatientDirectory: Send + Sync {
    async fn patient(&self, id: Uuid) -> Result<Option<Patient>, StoreError>;
}

#[async_trait]
pub trait LeaveStore: Send + Sync {
    async fn insert_leave(&self, leave: DoctorLeave) -> Result<DoctorLeave, StoreError>;

    async fn leave(&self, id: Uuid) -> Result<Option<DoctorLeave>, StoreError>;

    async fn set_substitute(&self, id: Uuid, substitute_id: Uuid) -> Result<Option<DoctorLeave>, StoreError>;
}

/// Everything the booking core and the reconciler need from persistence.
pub trait ClinicStore:
    ScheduleSlotStore + AppointmentStore + DoctorDirectory + PatientDirectory + LeaveStore
{
}

impl<T> ClinicStore for T where
    T: ScheduleSlotStore + AppointmentStore + DoctorDirectory + PatientDirectory + LeaveStore
{
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ServiceType;
    use chrono::TimeZone;

    #[test]
    fn filter_matches_on_every_set_field() {
        let time = Utc.with_ymd_and_hms(2025, 6, 10, 9, 0, 0).unwrap();
        let appointment = Appointment {
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
        };

        assert!(AppointmentFilter::default().matches(&appointment));
        assert!(AppointmentFilter {
            start: Some(time),
            doctor_id: Some(appointment.doctor_id),
            status: Some(AppointmentStatus::Booked),
            ..AppointmentFilter::default()
        }
        .matches(&appointment));

        // End is exclusive.
        assert!(!AppointmentFilter {
            end: Some(time),
            ..AppointmentFilter::default()
        }
        .matches(&appointment));
        assert!(!AppointmentFilter {
            department_id: Some(Uuid::new_v4()),
            ..AppointmentFilter::default()
        }
        .matches(&appointment));
    }
}
