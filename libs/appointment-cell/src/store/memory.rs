// libs/appointment-cell/src/store/memory.rs
use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use shared_utils::YearMonth;

use crate::models::{Appointment, AppointmentStatus, DirectorySeed, Doctor, DoctorLeave, Patient, ScheduleSlot};
use crate::store::{
    AppointmentFilter, AppointmentStore, CapacityRule, DoctorDirectory, LeaveStore, PatientDirectory, Reassignment,
    ScheduleSlotStore, StatusChange, StoreError,
};

#[derive(Default)]
struct Tables {
    appointments: HashMap<Uuid, Appointment>,
    slots: Vec<ScheduleSlot>,
    doctors: HashMap<Uuid, Doctor>,
    patients: HashMap<Uuid, Patient>,
    leaves: HashMap<Uuid, DoctorLeave>,
}

impl Tables {
    fn capacity(&self, doctor_id: Uuid, rule: CapacityRule) -> Result<u32, StoreError> {
        match rule {
            CapacityRule::Grid => Ok(CapacityRule::GRID_CAPACITY),
            CapacityRule::PublishedSlot { date, time } => self
                .slots
                .iter()
                .find(|s| s.doctor_id == doctor_id && s.slot_date == date && s.slot_time == time)
                .map(|s| s.capacity)
                .ok_or(StoreError::NoSuchSlot),
        }
    }

    fn taken(&self, doctor_id: Uuid, instant: DateTime<Utc>) -> usize {
        self.appointments
            .values()
            .filter(|a| a.doctor_id == doctor_id && a.appointment_time == instant && a.occupies_slot())
            .count()
    }
}

/// Process-local store. All tables sit behind one lock so counting and
/// inserting happen under the same guard.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert_doctor(&self, doctor: Doctor) {
        self.tables.lock().await.doctors.insert(doctor.id, doctor);
    }

    pub async fn upsert_patient(&self, patient: Patient) {
        self.tables.lock().await.patients.insert(patient.id, patient);
    }

    /// Stores an appointment as-is, bypassing the capacity check.
    pub async fn seed_appointment(&self, appointment: Appointment) {
        self.tables.lock().await.appointments.insert(appointment.id, appointment);
    }

    pub async fn seed_slots(&self, slots: Vec<ScheduleSlot>) {
        self.tables.lock().await.slots.extend(slots);
    }

    pub async fn seed_directory(&self, seed: DirectorySeed) {
        let mut tables = self.tables.lock().await;
        tables.doctors.extend(seed.doctors.into_iter().map(|d| (d.id, d)));
        tables.patients.extend(seed.patients.into_iter().map(|p| (p.id, p)));
    }
}

fn sorted_by_time(mut rows: Vec<Appointment>) -> Vec<Appointment> {
    rows.sort_by_key(|a| (a.appointment_time, a.created_at));
    rows
}

#[async_trait]
impl ScheduleSlotStore for InMemoryStore {
    async fn slots_for_day(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<ScheduleSlot>, StoreError> {
        let tables = self.tables.lock().await;
        let mut slots: Vec<ScheduleSlot> = tables
            .slots
            .iter()
            .filter(|s| s.doctor_id == doctor_id && s.slot_date == date)
            .cloned()
            .collect();
        slots.sort_by_key(|s| s.slot_time);
        Ok(slots)
    }

    async fn slots_for_month(&self, doctor_id: Uuid, month: YearMonth) -> Result<Vec<ScheduleSlot>, StoreError> {
        let tables = self.tables.lock().await;
        let mut slots: Vec<ScheduleSlot> = tables
            .slots
            .iter()
            .filter(|s| s.doctor_id == doctor_id && month.contains(s.slot_date))
            .cloned()
            .collect();
        slots.sort_by_key(|s| (s.slot_date, s.slot_time));
        Ok(slots)
    }

    async fn slots_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<ScheduleSlot>, StoreError> {
        let tables = self.tables.lock().await;
        let mut slots: Vec<ScheduleSlot> = tables
            .slots
            .iter()
            .filter(|s| s.slot_date >= from && s.slot_date <= to)
            .cloned()
            .collect();
        slots.sort_by_key(|s| (s.slot_date, s.slot_time));
        Ok(slots)
    }

    async fn published_dates(&self) -> Result<Vec<NaiveDate>, StoreError> {
        let tables = self.tables.lock().await;
        let dates: BTreeSet<NaiveDate> = tables.slots.iter().map(|s| s.slot_date).collect();
        Ok(dates.into_iter().collect())
    }

    async fn has_published_schedule(&self, doctor_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.tables.lock().await.slots.iter().any(|s| s.doctor_id == doctor_id))
    }

    async fn doctors_with_slots_on(&self, date: NaiveDate) -> Result<Vec<Uuid>, StoreError> {
        let tables = self.tables.lock().await;
        let doctors: BTreeSet<Uuid> = tables
            .slots
            .iter()
            .filter(|s| s.slot_date == date)
            .map(|s| s.doctor_id)
            .collect();
        Ok(doctors.into_iter().collect())
    }

    async fn replace_month(
        &self,
        doctor_id: Uuid,
        month: YearMonth,
        slots: Vec<ScheduleSlot>,
    ) -> Result<Vec<ScheduleSlot>, StoreError> {
        let mut tables = self.tables.lock().await;
        let before = tables.slots.len();
        tables
            .slots
            .retain(|s| !(s.doctor_id == doctor_id && month.contains(s.slot_date)));
        debug!("Removed {} slots for doctor {} in {}", before - tables.slots.len(), doctor_id, month);

        tables.slots.extend(slots.iter().cloned());
        Ok(slots)
    }
}

#[async_trait]
impl AppointmentStore for InMemoryStore {
    async fn insert_within_capacity(
        &self,
        appointment: Appointment,
        rule: CapacityRule,
    ) -> Result<Appointment, StoreError> {
        let mut tables = self.tables.lock().await;

        let capacity = tables.capacity(appointment.doctor_id, rule)?;
        if tables.taken(appointment.doctor_id, appointment.appointment_time) >= capacity as usize {
            return Err(StoreError::CapacityExceeded);
        }

        tables.appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn reassign_within_capacity(
        &self,
        id: Uuid,
        change: Reassignment,
    ) -> Result<Option<Appointment>, StoreError> {
        let mut tables = self.tables.lock().await;

        let instant = match tables.appointments.get(&id) {
            Some(a) if a.status == AppointmentStatus::Booked && a.doctor_id == change.from_doctor => {
                a.appointment_time
            }
            _ => return Ok(None),
        };

        let capacity = tables.capacity(change.to_doctor, change.rule)?;
        if tables.taken(change.to_doctor, instant) >= capacity as usize {
            return Err(StoreError::CapacityExceeded);
        }

        Ok(tables.appointments.get_mut(&id).map(|appointment| {
            appointment.doctor_id = change.to_doctor;
            appointment.updated_at = change.at;
            appointment.clone()
        }))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        Ok(self.tables.lock().await.appointments.get(&id).cloned())
    }

    async fn list_for_patient(&self, patient_id: Uuid) -> Result<Vec<Appointment>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(sorted_by_time(
            tables.appointments.values().filter(|a| a.patient_id == patient_id).cloned().collect(),
        ))
    }

    async fn list_for_doctor(&self, doctor_id: Uuid) -> Result<Vec<Appointment>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(sorted_by_time(
            tables.appointments.values().filter(|a| a.doctor_id == doctor_id).cloned().collect(),
        ))
    }

    async fn list_for_doctor_between(
        &self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(sorted_by_time(
            tables
                .appointments
                .values()
                .filter(|a| a.doctor_id == doctor_id && a.appointment_time >= start && a.appointment_time < end)
                .cloned()
                .collect(),
        ))
    }

    async fn list_matching(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(sorted_by_time(
            tables.appointments.values().filter(|a| filter.matches(a)).cloned().collect(),
        ))
    }

    async fn list_booked_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Appointment>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(sorted_by_time(
            tables
                .appointments
                .values()
                .filter(|a| {
                    a.status == AppointmentStatus::Booked
                        && a.check_in_time.is_none()
                        && a.appointment_time < cutoff
                })
                .cloned()
                .collect(),
        ))
    }

    async fn list_reminder_candidates(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(sorted_by_time(
            tables
                .appointments
                .values()
                .filter(|a| {
                    a.status == AppointmentStatus::Booked
                        && a.reminder_sent_at.is_none()
                        && a.appointment_time >= from
                        && a.appointment_time <= to
                })
                .cloned()
                .collect(),
        ))
    }

    async fn transition(&self, id: Uuid, change: StatusChange) -> Result<Option<Appointment>, StoreError> {
        let mut tables = self.tables.lock().await;

        let Some(appointment) = tables.appointments.get_mut(&id) else {
            return Ok(None);
        };
        if appointment.status != change.from {
            return Ok(None);
        }

        appointment.status = change.to;
        appointment.updated_at = change.at;
        if change.check_in && appointment.check_in_time.is_none() {
            appointment.check_in_time = Some(change.at);
        }

        Ok(Some(appointment.clone()))
    }

    async fn claim_reminder(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;

        match tables.appointments.get_mut(&id) {
            Some(appointment)
                if appointment.status == AppointmentStatus::Booked && appointment.reminder_sent_at.is_none() =>
            {
                appointment.reminder_sent_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_reminder(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if let Some(appointment) = tables.appointments.get_mut(&id) {
            appointment.reminder_sent_at = None;
        }
        Ok(())
    }
}

#[async_trait]
impl DoctorDirectory for InMemoryStore {
    async fn doctor(&self, id: Uuid) -> Result<Option<Doctor>, StoreError> {
        Ok(self.tables.lock().await.doctors.get(&id).cloned())
    }

    async fn doctors_in_department(&self, department_id: Uuid) -> Result<Vec<Doctor>, StoreError> {
        let tables = self.tables.lock().await;
        let mut doctors: Vec<Doctor> = tables
            .doctors
            .values()
            .filter(|d| d.department_id == Some(department_id))
            .cloned()
            .collect();
        doctors.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(doctors)
    }
}

#[async_trait]
impl PatientDirectory for InMemoryStore {
    async fn patient(&self, id: Uuid) -> Result<Option<Patient>, StoreError> {
        Ok(self.tables.lock().await.patients.get(&id).cloned())
    }
}

#[async_trait]
impl LeaveStore for InMemoryStore {
    async fn insert_leave(&self, leave: DoctorLeave) -> Result<DoctorLeave, StoreError> {
        self.tables.lock().await.leaves.insert(leave.id, leave.clone());
        Ok(leave)
    }

    async fn leave(&self, id: Uuid) -> Result<Option<DoctorLeave>, StoreError> {
        Ok(self.tables.lock().await.leaves.get(&id).cloned())
    }

    async fn set_substitute(&self, id: Uuid, substitute_id: Uuid) -> Result<Option<DoctorLeave>, StoreError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.leaves.get_mut(&id).map(|leave| {
            leave.substitute_doctor_id = Some(substitute_id);
            leave.clone()
        }))
    }
}
