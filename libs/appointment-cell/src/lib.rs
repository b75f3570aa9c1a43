pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod state;
pub mod store;

pub use models::*;
pub use state::AppointmentState;
pub use store::{ClinicStore, InMemoryStore, StoreError, SupabaseStore};
