// libs/appointment-cell/src/services/leave.rs
use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use shared_utils::Clock;

use crate::models::{
    AppointmentError, AppointmentStatus, CreateLeaveRequest, Doctor, DoctorLeave, ReassignmentReport,
    SkippedAppointment,
};
use crate::services::booking::AppointmentBookingService;
use crate::state::AppointmentState;
use crate::store::{AppointmentFilter, ClinicStore, Reassignment, StoreError};

/// Doctor absences and moving their booked patients to a colleague.
pub struct LeaveService {
    store: Arc<dyn ClinicStore>,
    clock: Arc<dyn Clock>,
    booking: AppointmentBookingService,
}

impl LeaveService {
    pub fn new(state: &AppointmentState) -> Self {
        Self {
            store: Arc::clone(&state.store),
            clock: Arc::clone(&state.clock),
            booking: AppointmentBookingService::new(state),
        }
    }

    async fn active_doctor(&self, id: Uuid) -> Result<Doctor, AppointmentError> {
        match self.store.doctor(id).await? {
            Some(doctor) if doctor.is_active => Ok(doctor),
            _ => Err(AppointmentError::DoctorNotFound(id)),
        }
    }

    /// A substitute must be a different, active doctor of the same department.
    async fn check_substitute(&self, absent: &Doctor, substitute_id: Uuid) -> Result<Doctor, AppointmentError> {
        if substitute_id == absent.id {
            return Err(AppointmentError::ValidationError(
                "a doctor cannot substitute for themselves".to_string(),
            ));
        }

        let substitute = self.active_doctor(substitute_id).await?;
        if substitute.department_id != absent.department_id {
            return Err(AppointmentError::ValidationError(format!(
                "doctor {} is not in the same department as doctor {}",
                substitute.id, absent.id
            )));
        }
        Ok(substitute)
    }

    async fn get_leave(&self, id: Uuid) -> Result<DoctorLeave, AppointmentError> {
        self.store.leave(id).await?.ok_or(AppointmentError::LeaveNotFound(id))
    }

    #[instrument(skip(self, request), fields(doctor_id = %request.doctor_id))]
    pub async fn create_leave(&self, request: CreateLeaveRequest) -> Result<DoctorLeave, AppointmentError> {
        if request.start_time >= request.end_time {
            return Err(AppointmentError::ValidationError(
                "leave must end after it starts".to_string(),
            ));
        }

        let doctor = self.active_doctor(request.doctor_id).await?;
        if let Some(substitute_id) = request.substitute_doctor_id {
            self.check_substitute(&doctor, substitute_id).await?;
        }

        let leave = DoctorLeave {
            id: Uuid::new_v4(),
            doctor_id: doctor.id,
            start_time: request.start_time,
            end_time: request.end_time,
            substitute_doctor_id: request.substitute_doctor_id,
            created_at: self.clock.now(),
        };

        let stored = self.store.insert_leave(leave).await?;
        info!(
            "Leave {} recorded for doctor {} from {} to {}",
            stored.id, stored.doctor_id, stored.start_time, stored.end_time
        );
        Ok(stored)
    }

    /// Active doctors who can cover the leave: same department, not the absent doctor.
    pub async fn substitutes(&self, leave_id: Uuid) -> Result<Vec<Doctor>, AppointmentError> {
        let leave = self.get_leave(leave_id).await?;
        let absent = self
            .store
            .doctor(leave.doctor_id)
            .await?
            .ok_or(AppointmentError::DoctorNotFound(leave.doctor_id))?;

        let Some(department_id) = absent.department_id else {
            return Ok(Vec::new());
        };

        Ok(self
            .store
            .doctors_in_department(department_id)
            .await?
            .into_iter()
            .filter(|d| d.is_active && d.id != absent.id)
            .collect())
    }

    /// Moves every booked appointment of the absent doctor inside the leave
    /// window to the substitute. Each move is capacity-checked on its own; the
    /// ones that do not fit stay with the absent doctor and are reported.
    #[instrument(skip(self))]
    pub async fn reassign(
        &self,
        leave_id: Uuid,
        substitute_id: Option<Uuid>,
    ) -> Result<ReassignmentReport, AppointmentError> {
        let leave = self.get_leave(leave_id).await?;
        let substitute_id = substitute_id
            .or(leave.substitute_doctor_id)
            .ok_or_else(|| AppointmentError::ValidationError("leave has no substitute doctor".to_string()))?;

        let absent = self
            .store
            .doctor(leave.doctor_id)
            .await?
            .ok_or(AppointmentError::DoctorNotFound(leave.doctor_id))?;
        self.check_substitute(&absent, substitute_id).await?;

        if leave.substitute_doctor_id != Some(substitute_id) {
            self.store.set_substitute(leave.id, substitute_id).await?;
        }

        let affected = self
            .store
            .list_matching(&AppointmentFilter {
                start: Some(leave.start_time),
                end: Some(leave.end_time),
                doctor_id: Some(leave.doctor_id),
                status: Some(AppointmentStatus::Booked),
                ..AppointmentFilter::default()
            })
            .await?;

        let mut moved = Vec::new();
        let mut skipped = Vec::new();

        for appointment in affected {
            let skip = |reason: &str| SkippedAppointment {
                appointment_id: appointment.id,
                appointment_time: appointment.appointment_time,
                reason: reason.to_string(),
            };

            let rule = match self.booking.capacity_rule(substitute_id, appointment.appointment_time).await {
                Ok(rule) => rule,
                Err(AppointmentError::NoSuchSlot) => {
                    skipped.push(skip("substitute has no slot at this time"));
                    continue;
                }
                Err(e) => return Err(e),
            };

            let change = Reassignment {
                from_doctor: leave.doctor_id,
                to_doctor: substitute_id,
                rule,
                at: self.clock.now(),
            };

            match self.store.reassign_within_capacity(appointment.id, change).await {
                Ok(Some(updated)) => moved.push(updated),
                Ok(None) => skipped.push(skip("appointment changed before it could be moved")),
                Err(StoreError::CapacityExceeded) => skipped.push(skip("substitute slot is full")),
                Err(StoreError::NoSuchSlot) => skipped.push(skip("substitute has no slot at this time")),
                Err(e) => return Err(e.into()),
            }
        }

        if !skipped.is_empty() {
            warn!("{} appointments of leave {} could not be moved", skipped.len(), leave.id);
        }
        info!(
            "Moved {} appointments from doctor {} to doctor {}",
            moved.len(),
            leave.doctor_id,
            substitute_id
        );

        Ok(ReassignmentReport {
            leave_id: leave.id,
            substitute_doctor_id: substitute_id,
            moved,
            skipped,
        })
    }
}
