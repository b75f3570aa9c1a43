// libs/appointment-cell/src/services/lifecycle.rs
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_utils::Clock;

use crate::models::{Appointment, AppointmentError, AppointmentStatus};
use crate::state::AppointmentState;
use crate::store::{ClinicStore, StatusChange};

pub struct AppointmentLifecycleService {
    store: Arc<dyn ClinicStore>,
    clock: Arc<dyn Clock>,
}

impl AppointmentLifecycleService {
    pub fn new(state: &AppointmentState) -> Self {
        Self::with_parts(Arc::clone(&state.store), Arc::clone(&state.clock))
    }

    pub fn with_parts(store: Arc<dyn ClinicStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if !Self::valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidTransition {
                from: current_status,
                to: new_status,
            });
        }

        Ok(())
    }

    /// All valid next statuses for a given current status
    pub fn valid_transitions(current_status: AppointmentStatus) -> &'static [AppointmentStatus] {
        match current_status {
            AppointmentStatus::Booked => &[
                AppointmentStatus::CheckedIn,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::CheckedIn => &[AppointmentStatus::Completed],
            // Terminal states
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow => &[],
        }
    }

    #[instrument(skip(self))]
    pub async fn check_in(&self, id: Uuid) -> Result<Appointment, AppointmentError> {
        self.apply(id, AppointmentStatus::CheckedIn).await
    }

    #[instrument(skip(self))]
    pub async fn cancel(&self, id: Uuid) -> Result<Appointment, AppointmentError> {
        self.apply(id, AppointmentStatus::Cancelled).await
    }

    /// Reconciler-only transition.
    #[instrument(skip(self))]
    pub async fn mark_no_show(&self, id: Uuid) -> Result<Appointment, AppointmentError> {
        self.apply(id, AppointmentStatus::NoShow).await
    }

    /// Generic status update. Goes through the same transition table and never
    /// produces `no_show`, which belongs to the reconciler.
    #[instrument(skip(self))]
    pub async fn update_status(&self, id: Uuid, status: &str) -> Result<Appointment, AppointmentError> {
        let target: AppointmentStatus = status.parse()?;

        if target == AppointmentStatus::NoShow {
            let current = self.current(id).await?;
            warn!("Refusing manual no_show for appointment {}", id);
            return Err(AppointmentError::InvalidTransition {
                from: current.status,
                to: target,
            });
        }

        self.apply(id, target).await
    }

    async fn current(&self, id: Uuid) -> Result<Appointment, AppointmentError> {
        self.store.get(id).await?.ok_or(AppointmentError::NotFound)
    }

    async fn apply(&self, id: Uuid, target: AppointmentStatus) -> Result<Appointment, AppointmentError> {
        // Step 1: Validate against the current status
        let current = self.current(id).await?;
        self.validate_status_transition(current.status, target)?;

        // Step 2: Compare-and-set so a concurrent change is never overwritten
        let change = StatusChange {
            from: current.status,
            to: target,
            at: self.clock.now(),
            check_in: target == AppointmentStatus::CheckedIn,
        };

        match self.store.transition(id, change).await? {
            Some(updated) => {
                info!("Appointment {} moved {} -> {}", id, current.status, updated.status);
                Ok(updated)
            }
            None => {
                let latest = self.current(id).await?;
                warn!(
                    "Appointment {} changed to {} before {} could be applied",
                    id, latest.status, target
                );
                Err(AppointmentError::InvalidTransition {
                    from: latest.status,
                    to: target,
                })
            }
        }
    }
}
