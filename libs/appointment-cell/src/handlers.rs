// libs/appointment-cell/src/handlers.rs
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::error::{success_envelope, AppError};

use crate::models::{
    AppointmentListQuery, CreateAppointmentRequest, CreateLeaveRequest, DateQuery, MonthQuery,
    PublishScheduleRequest, ReassignRequest, UpdateStatusRequest, WeekQuery, WeeksQuery,
};
use crate::services::{
    AppointmentBookingService, AppointmentLifecycleService, AvailabilityService, LeaveService, QueueService,
    ScheduleService,
};
use crate::state::AppointmentState;

// ==============================================================================
// EXTRACTOR HELPERS
// ==============================================================================

// Extractor rejections become validation errors so every failure uses the envelope.

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::ValidationError(format!("Invalid request body: {}", rejection.body_text())))
}

fn path_id(path: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, AppError> {
    path.map(|Path(id)| id)
        .map_err(|rejection| AppError::ValidationError(format!("Invalid id: {}", rejection.body_text())))
}

fn query<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| AppError::ValidationError(format!("Invalid query: {}", rejection.body_text())))
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<AppointmentState>,
    payload: Result<Json<CreateAppointmentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let request = json_body(payload)?;
    let booking_service = AppointmentBookingService::new(&state);

    let appointment = booking_service.create_appointment(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(success_envelope(json!({
            "appointment": appointment,
            "message": "Appointment booked successfully"
        }))),
    ))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<AppointmentState>,
    appointment_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Value>, AppError> {
    let appointment_id = path_id(appointment_id)?;
    let appointment = AppointmentBookingService::new(&state).get_appointment(appointment_id).await?;

    Ok(Json(success_envelope(json!({ "appointment": appointment }))))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<AppointmentState>,
    params: Result<Query<AppointmentListQuery>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let params = query(params)?;
    let appointments = AppointmentBookingService::new(&state)
        .list_appointments(params)
        .await?;

    Ok(Json(success_envelope(json!({
        "appointments": appointments,
        "total": appointments.len()
    }))))
}

#[axum::debug_handler]
pub async fn get_patient_appointments(
    State(state): State<AppointmentState>,
    patient_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Value>, AppError> {
    let patient_id = path_id(patient_id)?;
    let appointments = AppointmentBookingService::new(&state)
        .appointments_for_patient(patient_id)
        .await?;

    Ok(Json(success_envelope(json!({
        "patient_id": patient_id,
        "appointments": appointments,
        "total": appointments.len()
    }))))
}

#[axum::debug_handler]
pub async fn get_doctor_appointments(
    State(state): State<AppointmentState>,
    doctor_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = path_id(doctor_id)?;
    let appointments = AppointmentBookingService::new(&state)
        .appointments_for_doctor(doctor_id)
        .await?;

    Ok(Json(success_envelope(json!({
        "doctor_id": doctor_id,
        "appointments": appointments,
        "total": appointments.len()
    }))))
}

// ==============================================================================
// AVAILABILITY HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<AppointmentState>,
    doctor_id: Result<Path<Uuid>, PathRejection>,
    params: Result<Query<DateQuery>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = path_id(doctor_id)?;
    let params = query(params)?;

    let slots = AvailabilityService::new(&state)
        .available_slots(doctor_id, &params.date)
        .await?;

    Ok(Json(success_envelope(json!({
        "doctor_id": doctor_id,
        "date": params.date,
        "available_slots": slots
    }))))
}

#[axum::debug_handler]
pub async fn get_available_doctors(
    State(state): State<AppointmentState>,
    params: Result<Query<DateQuery>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let params = query(params)?;
    let doctors = AvailabilityService::new(&state)
        .available_doctors(&params.date)
        .await?;

    Ok(Json(success_envelope(json!({
        "date": params.date,
        "doctors": doctors
    }))))
}

// ==============================================================================
// STATUS HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<AppointmentState>,
    appointment_id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let appointment_id = path_id(appointment_id)?;
    let request = json_body(payload)?;

    let appointment = AppointmentLifecycleService::new(&state)
        .update_status(appointment_id, &request.status)
        .await?;

    Ok(Json(success_envelope(json!({
        "appointment": appointment,
        "message": format!("Appointment status updated to {}", appointment.status)
    }))))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<AppointmentState>,
    appointment_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Value>, AppError> {
    let appointment_id = path_id(appointment_id)?;
    let appointment = AppointmentLifecycleService::new(&state).cancel(appointment_id).await?;

    Ok(Json(success_envelope(json!({
        "appointment": appointment,
        "message": "Appointment cancelled"
    }))))
}

#[axum::debug_handler]
pub async fn check_in_appointment(
    State(state): State<AppointmentState>,
    appointment_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Value>, AppError> {
    let appointment_id = path_id(appointment_id)?;
    let appointment = AppointmentLifecycleService::new(&state).check_in(appointment_id).await?;

    Ok(Json(success_envelope(json!({
        "appointment": appointment,
        "message": "Checked in"
    }))))
}

// ==============================================================================
// QUEUE AND SCHEDULE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_live_queue(
    State(state): State<AppointmentState>,
    doctor_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = path_id(doctor_id)?;
    let queue = QueueService::new(&state).live_queue(doctor_id).await?;

    Ok(Json(success_envelope(json!({ "queue": queue }))))
}

#[axum::debug_handler]
pub async fn get_published_slots(
    State(state): State<AppointmentState>,
    params: Result<Query<MonthQuery>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let params = query(params)?;
    let days = ScheduleService::new(&state)
        .published_month(params.doctor_id, &params.month)
        .await?;

    Ok(Json(success_envelope(json!({
        "doctor_id": params.doctor_id,
        "month": params.month,
        "days": days
    }))))
}

#[axum::debug_handler]
pub async fn publish_slots(
    State(state): State<AppointmentState>,
    payload: Result<Json<PublishScheduleRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let request = json_body(payload)?;
    let doctor_id = request.doctor_id;
    let month = request.month.clone();

    let slots = ScheduleService::new(&state).publish_month(request).await?;

    Ok(Json(success_envelope(json!({
        "doctor_id": doctor_id,
        "month": month,
        "slots": slots,
        "message": "Schedule published"
    }))))
}

#[axum::debug_handler]
pub async fn get_published_months(State(state): State<AppointmentState>) -> Result<Json<Value>, AppError> {
    let months: Vec<String> = ScheduleService::new(&state)
        .published_months()
        .await?
        .iter()
        .map(|m| m.to_string())
        .collect();

    Ok(Json(success_envelope(json!({ "months": months }))))
}

#[axum::debug_handler]
pub async fn get_schedule_weeks(
    State(state): State<AppointmentState>,
    params: Result<Query<WeeksQuery>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let params = query(params)?;
    let weeks = ScheduleService::new(&state).weeks_in_month(&params.month).await?;

    Ok(Json(success_envelope(json!({
        "month": params.month,
        "weeks": weeks
    }))))
}

#[axum::debug_handler]
pub async fn get_schedule_week(
    State(state): State<AppointmentState>,
    params: Result<Query<WeekQuery>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let params = query(params)?;
    let week = ScheduleService::new(&state).week_view(&params.week).await?;

    Ok(Json(success_envelope(json!({ "week": week }))))
}

// ==============================================================================
// LEAVE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_leave(
    State(state): State<AppointmentState>,
    payload: Result<Json<CreateLeaveRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let request = json_body(payload)?;
    let leave = LeaveService::new(&state).create_leave(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(success_envelope(json!({
            "leave": leave,
            "message": "Leave recorded"
        }))),
    ))
}

#[axum::debug_handler]
pub async fn get_leave_substitutes(
    State(state): State<AppointmentState>,
    leave_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Value>, AppError> {
    let leave_id = path_id(leave_id)?;
    let doctors = LeaveService::new(&state).substitutes(leave_id).await?;

    Ok(Json(success_envelope(json!({
        "leave_id": leave_id,
        "doctors": doctors
    }))))
}

#[axum::debug_handler]
pub async fn reassign_leave(
    State(state): State<AppointmentState>,
    leave_id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<ReassignRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let leave_id = path_id(leave_id)?;
    let request = json_body(payload)?;

    let report = LeaveService::new(&state)
        .reassign(leave_id, request.substitute_doctor_id)
        .await?;

    Ok(Json(success_envelope(json!({
        "report": report,
        "message": format!("Moved {} appointments", report.moved.len())
    }))))
}
