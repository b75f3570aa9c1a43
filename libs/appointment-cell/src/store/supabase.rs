// libs/appointment-cell/src/store/supabase.rs
use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info};
use uuid::Uuid;

use shared_database::supabase::{SupabaseClient, SupabaseError};
use shared_utils::YearMonth;

use crate::models::{Appointment, AppointmentStatus, Doctor, DoctorLeave, Patient, ScheduleSlot};
use crate::store::{
    AppointmentFilter, AppointmentStore, CapacityRule, DoctorDirectory, LeaveStore, PatientDirectory, Reassignment,
    ScheduleSlotStore, StatusChange, StoreError,
};

/// PostgREST-backed store. Booking and month replacement go through the
/// Postgres functions in `sql/book_appointment.sql` so they run in one transaction.
pub struct SupabaseStore {
    supabase: Arc<SupabaseClient>,
}

impl From<SupabaseError> for StoreError {
    fn from(error: SupabaseError) -> Self {
        match error {
            SupabaseError::Decode(msg) => StoreError::Decode(msg),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

#[derive(Deserialize)]
struct DoctorRef {
    doctor_id: Uuid,
}

#[derive(Deserialize)]
struct DateRef {
    slot_date: NaiveDate,
}

fn encode_instant(instant: DateTime<Utc>) -> String {
    urlencoding::encode(&instant.to_rfc3339_opts(SecondsFormat::Micros, true)).into_owned()
}

/// `p_slot_date`/`p_slot_time` arguments; both null select the grid capacity.
fn rule_args(rule: CapacityRule) -> (Value, Value) {
    match rule {
        CapacityRule::PublishedSlot { date, time } => (json!(date), json!(time)),
        CapacityRule::Grid => (Value::Null, Value::Null),
    }
}

/// The capacity-checked functions raise unique_violation (409) when the key is
/// full and PT404 when the named slot is gone. PostgREST's own 404s carry a PGRST code.
fn capacity_error(function: &str, error: SupabaseError) -> StoreError {
    match error {
        SupabaseError::Conflict(detail) => {
            debug!("{} refused: {}", function, detail);
            StoreError::CapacityExceeded
        }
        SupabaseError::NotFound(detail) if !detail.contains("PGRST") => {
            debug!("{} found no slot: {}", function, detail);
            StoreError::NoSuchSlot
        }
        other => {
            error!("{} failed: {}", function, other);
            other.into()
        }
    }
}

impl SupabaseStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn fetch_appointments(&self, filters: &[String]) -> Result<Vec<Appointment>, StoreError> {
        let mut query = filters.to_vec();
        query.push("order=appointment_time.asc".to_string());
        let path = format!("/rest/v1/appointments?{}", query.join("&"));
        debug!("Fetching appointments: {}", path);

        let rows: Vec<Appointment> = self.supabase.request(Method::GET, &path, None, None).await?;
        Ok(rows)
    }

    async fn fetch_slots(&self, filters: &[String]) -> Result<Vec<ScheduleSlot>, StoreError> {
        let mut query = filters.to_vec();
        query.push("order=slot_date.asc,slot_time.asc".to_string());
        let path = format!("/rest/v1/schedule_slots?{}", query.join("&"));

        let rows: Vec<ScheduleSlot> = self.supabase.request(Method::GET, &path, None, None).await?;
        Ok(rows)
    }

    async fn patch_appointments(&self, filters: &[String], body: Value) -> Result<Vec<Appointment>, StoreError> {
        let path = format!("/rest/v1/appointments?{}", filters.join("&"));
        let rows: Vec<Appointment> = self
            .supabase
            .request_returning(Method::PATCH, &path, Some(body))
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl ScheduleSlotStore for SupabaseStore {
    async fn slots_for_day(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<ScheduleSlot>, StoreError> {
        self.fetch_slots(&[format!("doctor_id=eq.{}", doctor_id), format!("slot_date=eq.{}", date)])
            .await
    }

    async fn slots_for_month(&self, doctor_id: Uuid, month: YearMonth) -> Result<Vec<ScheduleSlot>, StoreError> {
        self.fetch_slots(&[
            format!("doctor_id=eq.{}", doctor_id),
            format!("slot_date=gte.{}", month.first_day()),
            format!("slot_date=lte.{}", month.last_day()),
        ])
        .await
    }

    async fn slots_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<ScheduleSlot>, StoreError> {
        self.fetch_slots(&[format!("slot_date=gte.{}", from), format!("slot_date=lte.{}", to)])
            .await
    }

    async fn published_dates(&self) -> Result<Vec<NaiveDate>, StoreError> {
        let path = "/rest/v1/schedule_slots?select=slot_date&order=slot_date.asc";
        let rows: Vec<DateRef> = self.supabase.request(Method::GET, path, None, None).await?;

        let dates: BTreeSet<NaiveDate> = rows.into_iter().map(|r| r.slot_date).collect();
        Ok(dates.into_iter().collect())
    }

    async fn has_published_schedule(&self, doctor_id: Uuid) -> Result<bool, StoreError> {
        let path = format!("/rest/v1/schedule_slots?doctor_id=eq.{}&select=doctor_id&limit=1", doctor_id);
        let rows: Vec<DoctorRef> = self.supabase.request(Method::GET, &path, None, None).await?;
        Ok(!rows.is_empty())
    }

    async fn doctors_with_slots_on(&self, date: NaiveDate) -> Result<Vec<Uuid>, StoreError> {
        let path = format!("/rest/v1/schedule_slots?slot_date=eq.{}&select=doctor_id", date);
        let rows: Vec<DoctorRef> = self.supabase.request(Method::GET, &path, None, None).await?;

        let doctors: BTreeSet<Uuid> = rows.into_iter().map(|r| r.doctor_id).collect();
        Ok(doctors.into_iter().collect())
    }

    async fn replace_month(
        &self,
        doctor_id: Uuid,
        month: YearMonth,
        slots: Vec<ScheduleSlot>,
    ) -> Result<Vec<ScheduleSlot>, StoreError> {
        let args = json!({
            "p_doctor_id": doctor_id,
            "p_month_start": month.first_day(),
            "p_month_end": month.last_day(),
            "p_slots": slots,
        });

        let stored: Vec<ScheduleSlot> = self.supabase.rpc("replace_schedule_month", args).await?;
        info!("Replaced schedule for doctor {} in {} with {} slots", doctor_id, month, stored.len());
        Ok(stored)
    }
}

#[async_trait]
impl AppointmentStore for SupabaseStore {
    async fn insert_within_capacity(
        &self,
        appointment: Appointment,
        rule: CapacityRule,
    ) -> Result<Appointment, StoreError> {
        let (slot_date, slot_time) = rule_args(rule);
        let args = json!({
            "p_id": appointment.id,
            "p_department_id": appointment.department_id,
            "p_doctor_id": appointment.doctor_id,
            "p_patient_id": appointment.patient_id,
            "p_appointment_time": appointment.appointment_time,
            "p_service_type": appointment.service_type,
            "p_slot_date": slot_date,
            "p_slot_time": slot_time,
            "p_created_at": appointment.created_at,
        });

        self.supabase
            .rpc::<Appointment>("book_appointment", args)
            .await
            .map_err(|e| capacity_error("book_appointment", e))
    }

    async fn reassign_within_capacity(
        &self,
        id: Uuid,
        change: Reassignment,
    ) -> Result<Option<Appointment>, StoreError> {
        let (slot_date, slot_time) = rule_args(change.rule);
        let args = json!({
            "p_id": id,
            "p_from_doctor_id": change.from_doctor,
            "p_to_doctor_id": change.to_doctor,
            "p_slot_date": slot_date,
            "p_slot_time": slot_time,
            "p_updated_at": change.at,
        });

        let rows: Vec<Appointment> = self
            .supabase
            .rpc("reassign_appointment", args)
            .await
            .map_err(|e| capacity_error("reassign_appointment", e))?;
        Ok(rows.into_iter().next())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        let rows = self.fetch_appointments(&[format!("id=eq.{}", id), "limit=1".to_string()]).await?;
        Ok(rows.into_iter().next())
    }

    async fn list_for_patient(&self, patient_id: Uuid) -> Result<Vec<Appointment>, StoreError> {
        self.fetch_appointments(&[format!("patient_id=eq.{}", patient_id)]).await
    }

    async fn list_for_doctor(&self, doctor_id: Uuid) -> Result<Vec<Appointment>, StoreError> {
        self.fetch_appointments(&[format!("doctor_id=eq.{}", doctor_id)]).await
    }

    async fn list_for_doctor_between(
        &self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, StoreError> {
        self.fetch_appointments(&[
            format!("doctor_id=eq.{}", doctor_id),
            format!("appointment_time=gte.{}", encode_instant(start)),
            format!("appointment_time=lt.{}", encode_instant(end)),
        ])
        .await
    }

    async fn list_matching(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        let mut filters = Vec::new();
        if let Some(start) = filter.start {
            filters.push(format!("appointment_time=gte.{}", encode_instant(start)));
        }
        if let Some(end) = filter.end {
            filters.push(format!("appointment_time=lt.{}", encode_instant(end)));
        }
        if let Some(department_id) = filter.department_id {
            filters.push(format!("department_id=eq.{}", department_id));
        }
        if let Some(doctor_id) = filter.doctor_id {
            filters.push(format!("doctor_id=eq.{}", doctor_id));
        }
        if let Some(status) = filter.status {
            filters.push(format!("status=eq.{}", status));
        }

        self.fetch_appointments(&filters).await
    }

    async fn list_booked_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Appointment>, StoreError> {
        self.fetch_appointments(&[
            format!("status=eq.{}", AppointmentStatus::Booked),
            "check_in_time=is.null".to_string(),
            format!("appointment_time=lt.{}", encode_instant(cutoff)),
        ])
        .await
    }

    async fn list_reminder_candidates(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, StoreError> {
        self.fetch_appointments(&[
            format!("status=eq.{}", AppointmentStatus::Booked),
            "reminder_sent_at=is.null".to_string(),
            format!("appointment_time=gte.{}", encode_instant(from)),
            format!("appointment_time=lte.{}", encode_instant(to)),
        ])
        .await
    }

    async fn transition(&self, id: Uuid, change: StatusChange) -> Result<Option<Appointment>, StoreError> {
        let mut filters = vec![format!("id=eq.{}", id), format!("status=eq.{}", change.from)];
        let mut body = json!({
            "status": change.to,
            "updated_at": change.at,
        });
        if change.check_in {
            filters.push("check_in_time=is.null".to_string());
            body["check_in_time"] = json!(change.at);
        }

        let rows = self.patch_appointments(&filters, body).await?;
        Ok(rows.into_iter().next())
    }

    async fn claim_reminder(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let filters = [
            format!("id=eq.{}", id),
            format!("status=eq.{}", AppointmentStatus::Booked),
            "reminder_sent_at=is.null".to_string(),
        ];
        let rows = self.patch_appointments(&filters, json!({ "reminder_sent_at": at })).await?;
        Ok(!rows.is_empty())
    }

    async fn release_reminder(&self, id: Uuid) -> Result<(), StoreError> {
        self.patch_appointments(&[format!("id=eq.{}", id)], json!({ "reminder_sent_at": null }))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DoctorDirectory for SupabaseStore {
    async fn doctor(&self, id: Uuid) -> Result<Option<Doctor>, StoreError> {
        let path = format!("/rest/v1/doctors?id=eq.{}&limit=1", id);
        let rows: Vec<Doctor> = self.supabase.request(Method::GET, &path, None, None).await?;
        Ok(rows.into_iter().next())
    }

    async fn doctors_in_department(&self, department_id: Uuid) -> Result<Vec<Doctor>, StoreError> {
        let path = format!("/rest/v1/doctors?department_id=eq.{}&order=name.asc", department_id);
        let rows: Vec<Doctor> = self.supabase.request(Method::GET, &path, None, None).await?;
        Ok(rows)
    }
}

#[async_trait]
impl PatientDirectory for SupabaseStore {
    async fn patient(&self, id: Uuid) -> Result<Option<Patient>, StoreError> {
        let path = format!("/rest/v1/patients?id=eq.{}&limit=1", id);
        let rows: Vec<Patient> = self.supabase.request(Method::GET, &path, None, None).await?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl LeaveStore for SupabaseStore {
    async fn insert_leave(&self, leave: DoctorLeave) -> Result<DoctorLeave, StoreError> {
        let body = serde_json::to_value(&leave).map_err(|e| StoreError::Decode(e.to_string()))?;
        let rows: Vec<DoctorLeave> = self
            .supabase
            .request_returning(Method::POST, "/rest/v1/doctor_leaves", Some(body))
            .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode("insert returned no leave row".to_string()))
    }

    async fn leave(&self, id: Uuid) -> Result<Option<DoctorLeave>, StoreError> {
        let path = format!("/rest/v1/doctor_leaves?id=eq.{}&limit=1", id);
        let rows: Vec<DoctorLeave> = self.supabase.request(Method::GET, &path, None, None).await?;
        Ok(rows.into_iter().next())
    }

    async fn set_substitute(&self, id: Uuid, substitute_id: Uuid) -> Result<Option<DoctorLeave>, StoreError> {
        let path = format!("/rest/v1/doctor_leaves?id=eq.{}", id);
        let rows: Vec<DoctorLeave> = self
            .supabase
            .request_returning(
                Method::PATCH,
                &path,
                Some(json!({ "substitute_doctor_id": substitute_id })),
            )
            .await?;
        Ok(rows.into_iter().next())
    }
}
