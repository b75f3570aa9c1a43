// libs/appointment-cell/src/router.rs
use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::handlers;
use crate::state::AppointmentState;

/// Mounted under `/appointments`.
pub fn appointment_routes(state: AppointmentState) -> Router {
    Router::new()
        .route(
            "/",
            post(handlers::create_appointment).get(handlers::list_appointments),
        )
        .route("/available-doctors", get(handlers::get_available_doctors))
        .route("/patient/{patient_id}", get(handlers::get_patient_appointments))
        .route("/doctor/{doctor_id}", get(handlers::get_doctor_appointments))
        .route("/doctor/{doctor_id}/available", get(handlers::get_available_slots))
        .route(
            "/{appointment_id}",
            get(handlers::get_appointment).delete(handlers::cancel_appointment),
        )
        .route("/{appointment_id}/status", patch(handlers::update_appointment_status))
        .route("/{appointment_id}/checkin", post(handlers::check_in_appointment))
        .with_state(state)
}

/// Mounted under `/doctors`.
pub fn queue_routes(state: AppointmentState) -> Router {
    Router::new()
        .route("/{doctor_id}/queue", get(handlers::get_live_queue))
        .with_state(state)
}

/// Mounted under `/slots`.
pub fn schedule_routes(state: AppointmentState) -> Router {
    Router::new()
        .route(
            "/",
            get(handlers::get_published_slots).put(handlers::publish_slots),
        )
        .route("/months", get(handlers::get_published_months))
        .route("/weeks", get(handlers::get_schedule_weeks))
        .route("/week", get(handlers::get_schedule_week))
        .with_state(state)
}

/// Mounted under `/leaves`.
pub fn leave_routes(state: AppointmentState) -> Router {
    Router::new()
        .route("/", post(handlers::create_leave))
        .route("/{leave_id}/substitutes", get(handlers::get_leave_substitutes))
        .route("/{leave_id}/reassign", post(handlers::reassign_leave))
        .with_state(state)
}
