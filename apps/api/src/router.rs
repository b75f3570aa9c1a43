use axum::{routing::get, Router};

use appointment_cell::router::{appointment_routes, leave_routes, queue_routes, schedule_routes};
use appointment_cell::AppointmentState;

pub fn create_router(state: AppointmentState) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic booking API is running!" }))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/doctors", queue_routes(state.clone()))
        .nest("/slots", schedule_routes(state.clone()))
        .nest("/leaves", leave_routes(state))
}
