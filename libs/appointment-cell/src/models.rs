// libs/appointment-cell/src/models.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_models::error::AppError;

use crate::store::StoreError;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub department_id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_time: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub service_type: ServiceType,
    pub check_in_time: Option<DateTime<Utc>>,
    /// Set when the reminder for this appointment has been claimed for sending.
    pub reminder_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// Cancelled appointments release their seat; every other status holds it.
    pub fn occupies_slot(&self) -> bool {
        self.status != AppointmentStatus::Cancelled
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Booked,
    CheckedIn,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Booked => "booked",
            AppointmentStatus::CheckedIn => "checked_in",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = AppointmentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "booked" => Ok(AppointmentStatus::Booked),
            "checked_in" | "checked-in" => Ok(AppointmentStatus::CheckedIn),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" | "canceled" => Ok(AppointmentStatus::Cancelled),
            "no_show" | "no-show" => Ok(AppointmentStatus::NoShow),
            _ => Err(AppointmentError::InvalidStatus(value.to_string())),
        }
    }
}

/// Free-form service tag. `consult` and `vaccine` are the well-known values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ServiceType {
    Consult,
    Vaccine,
    Other(String),
}

impl From<String> for ServiceType {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "consult" => ServiceType::Consult,
            "vaccine" => ServiceType::Vaccine,
            _ => ServiceType::Other(value.trim().to_string()),
        }
    }
}

impl From<ServiceType> for String {
    fn from(value: ServiceType) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceType::Consult => write!(f, "consult"),
            ServiceType::Vaccine => write!(f, "vaccine"),
            ServiceType::Other(tag) => write!(f, "{}", tag),
        }
    }
}

// ==============================================================================
// SCHEDULE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleSlot {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub department_id: Option<Uuid>,
    /// Clinic-local calendar date.
    pub slot_date: NaiveDate,
    /// Clinic-local time of day.
    pub slot_time: NaiveTime,
    pub capacity: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Session {
    Morning,
    Afternoon,
}

impl Session {
    pub fn for_time(time: NaiveTime) -> Self {
        if time < NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN) {
            Session::Morning
        } else {
            Session::Afternoon
        }
    }
}

impl FromStr for Session {
    type Err = AppointmentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "morning" => Ok(Session::Morning),
            "afternoon" => Ok(Session::Afternoon),
            other => Err(AppointmentError::ValidationError(format!(
                "unknown session '{}', expected 'morning' or 'afternoon'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SlotSource {
    /// A slot staff published for the doctor.
    Published,
    /// The fixed working-hours grid used when nothing is published.
    Grid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailableSlot {
    pub slot: DateTime<Utc>,
    pub count: u32,
    pub capacity: u32,
    pub source: SlotSource,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublishedSession {
    pub session: Session,
    pub time: NaiveTime,
    pub capacity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublishedDay {
    pub date: NaiveDate,
    pub sessions: Vec<PublishedSession>,
}

// ==============================================================================
// DIRECTORY MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Doctor {
    pub id: Uuid,
    pub department_id: Option<Uuid>,
    pub name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
}

/// Doctors and patients loaded into the in-memory store at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DirectorySeed {
    #[serde(default)]
    pub doctors: Vec<Doctor>,
    #[serde(default)]
    pub patients: Vec<Patient>,
}

// ==============================================================================
// LEAVE MODELS
// ==============================================================================

/// A doctor's absence over `[start_time, end_time)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoctorLeave {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub substitute_doctor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl DoctorLeave {
    pub fn covers(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start_time && instant < self.end_time
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkippedAppointment {
    pub appointment_id: Uuid,
    pub appointment_time: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReassignmentReport {
    pub leave_id: Uuid,
    pub substitute_doctor_id: Uuid,
    pub moved: Vec<Appointment>,
    pub skipped: Vec<SkippedAppointment>,
}

// ==============================================================================
// WEEK GRID MODELS
// ==============================================================================

/// One doctor's load in one cell of the week grid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeekCell {
    pub doctor_id: Uuid,
    /// `None` when the doctor is missing from the directory.
    pub doctor_name: Option<String>,
    pub count: u32,
    pub capacity: u32,
    pub full: bool,
}

/// Slots sharing a time of day and department across the seven days.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeekRow {
    pub time: NaiveTime,
    pub session: Session,
    pub department_id: Option<Uuid>,
    /// Seven entries aligned with `WeekView::dates`.
    pub days: Vec<Vec<WeekCell>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeekView {
    pub week_start: NaiveDate,
    pub dates: Vec<NaiveDate>,
    pub rows: Vec<WeekRow>,
}

// ==============================================================================
// REQUEST / RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub department_id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_time: DateTime<Utc>,
    pub service_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DateQuery {
    pub date: String,
}

/// `GET /appointments` filters; every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentListQuery {
    pub date: Option<String>,
    pub department_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeekQuery {
    /// Any date of the wanted week, `YYYY-MM-DD`.
    pub week: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeeksQuery {
    pub month: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonthQuery {
    pub doctor_id: Uuid,
    pub month: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishScheduleRequest {
    pub doctor_id: Uuid,
    pub department_id: Option<Uuid>,
    /// `YYYY-MM`
    pub month: String,
    #[serde(default)]
    pub days: Vec<ScheduleDay>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleDay {
    pub date: String,
    pub sessions: Vec<String>,
    pub capacity: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLeaveRequest {
    pub doctor_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub substitute_doctor_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReassignRequest {
    /// Overrides the substitute recorded on the leave.
    pub substitute_doctor_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiveQueue {
    pub doctor_id: Uuid,
    pub entries: Vec<Appointment>,
    pub waiting_count: usize,
    pub estimated_wait_minutes: i64,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppointmentError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid appointment time: {0}")]
    InvalidTime(String),

    #[error("Invalid appointment status: {0}")]
    InvalidStatus(String),

    #[error("Cannot change appointment status from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Doctor has no schedule slot at the requested time")]
    NoSuchSlot,

    #[error("Appointment slot already taken")]
    SlotTaken,

    #[error("Appointment not found")]
    NotFound,

    #[error("Doctor {0} not found or inactive")]
    DoctorNotFound(Uuid),

    #[error("Patient {0} not found")]
    PatientNotFound(Uuid),

    #[error("Leave {0} not found")]
    LeaveNotFound(Uuid),

    #[error("Store error: {0}")]
    StoreError(String),
}

impl From<StoreError> for AppointmentError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::CapacityExceeded => AppointmentError::SlotTaken,
            StoreError::NoSuchSlot => AppointmentError::NoSuchSlot,
            other => AppointmentError::StoreError(other.to_string()),
        }
    }
}

impl From<AppointmentError> for AppError {
    fn from(error: AppointmentError) -> Self {
        match error {
            AppointmentError::ValidationError(_)
            | AppointmentError::InvalidTime(_)
            | AppointmentError::InvalidStatus(_) => AppError::ValidationError(error.to_string()),
            AppointmentError::InvalidTransition { .. } => AppError::BadRequest(error.to_string()),
            AppointmentError::NoSuchSlot
            | AppointmentError::NotFound
            | AppointmentError::DoctorNotFound(_)
            | AppointmentError::PatientNotFound(_)
            | AppointmentError::LeaveNotFound(_) => AppError::NotFound(error.to_string()),
            AppointmentError::SlotTaken => AppError::Conflict(error.to_string()),
            AppointmentError::StoreError(msg) => AppError::Database(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn status_round_trips_through_strings() {
        assert_eq!("checked_in".parse::<AppointmentStatus>(), Ok(AppointmentStatus::CheckedIn));
        assert_eq!("Canceled".parse::<AppointmentStatus>(), Ok(AppointmentStatus::Cancelled));
        assert_eq!(AppointmentStatus::NoShow.to_string(), "no_show");
        assert_eq!(
            "postponed".parse::<AppointmentStatus>(),
            Err(AppointmentError::InvalidStatus("postponed".to_string()))
        );
    }

    #[test]
    fn service_type_keeps_unknown_tags() {
        assert_eq!(ServiceType::from("Consult".to_string()), ServiceType::Consult);
        assert_eq!(
            ServiceType::from("dental cleaning".to_string()),
            ServiceType::Other("dental cleaning".to_string())
        );

        let json = serde_json::to_value(ServiceType::Vaccine).unwrap();
        assert_eq!(json, "vaccine");
    }

    #[test]
    fn session_follows_noon_boundary() {
        assert_eq!(Session::for_time(NaiveTime::from_hms_opt(9, 0, 0).unwrap()), Session::Morning);
        assert_eq!(Session::for_time(NaiveTime::from_hms_opt(13, 0, 0).unwrap()), Session::Afternoon);
        assert!("evening".parse::<Session>().is_err());
    }

    #[test]
    fn errors_map_to_http_status() {
        let cases = [
            (AppointmentError::ValidationError("x".into()), StatusCode::BAD_REQUEST),
            (AppointmentError::InvalidTime("x".into()), StatusCode::BAD_REQUEST),
            (AppointmentError::InvalidStatus("x".into()), StatusCode::BAD_REQUEST),
            (
                AppointmentError::InvalidTransition {
                    from: AppointmentStatus::Cancelled,
                    to: AppointmentStatus::Cancelled,
                },
                StatusCode::BAD_REQUEST,
            ),
            (AppointmentError::NoSuchSlot, StatusCode::NOT_FOUND),
            (AppointmentError::NotFound, StatusCode::NOT_FOUND),
            (AppointmentError::DoctorNotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (AppointmentError::PatientNotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (AppointmentError::SlotTaken, StatusCode::CONFLICT),
            (AppointmentError::StoreError("timeout".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, expected) in cases {
            assert_eq!(AppError::from(error).status_code(), expected);
        }

        assert_eq!(AppointmentError::from(StoreError::NoSuchSlot), AppointmentError::NoSuchSlot);
    }

    #[test]
    fn leave_window_is_half_open() {
        let start = DateTime::parse_from_rfc3339("2025-06-11T00:00:00Z").unwrap().with_timezone(&Utc);
        let end = DateTime::parse_from_rfc3339("2025-06-12T00:00:00Z").unwrap().with_timezone(&Utc);
        let leave = DoctorLeave {
            id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            start_time: start,
            end_time: end,
            substitute_doctor_id: None,
            created_at: start,
        };

        assert!(leave.covers(start));
        assert!(!leave.covers(end));
    }
}
