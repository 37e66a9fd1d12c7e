use std::sync::Arc;

use appointments_integrity::Appointment;
use chrono::{DateTime, Utc};
use clinic_shared::{ActorId, AppointmentId, ClinicError, ClinicResult};
use log::debug;

use crate::repository::AppointmentRepository;

/// Detects double-booking on a doctor's calendar.
///
/// Every appointment counts as occupying its slot, cancelled ones included.
/// Callers hold the doctor's calendar lock across check and write.
#[derive(Clone)]
pub struct ConflictChecker {
    appointments: Arc<dyn AppointmentRepository>,
}

impl ConflictChecker {
    pub fn new(appointments: Arc<dyn AppointmentRepository>) -> Self {
        Self { appointments }
    }

    /// Appointments of `doctor_id` overlapping `[start, end)`, minus `exclude`
    pub async fn conflicts(
        &self,
        doctor_id: ActorId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<AppointmentId>,
    ) -> ClinicResult<Vec<Appointment>> {
        let found = self
            .appointments
            .find_overlapping(doctor_id, start, end, exclude)
            .await?;
        if !found.is_empty() {
            debug!(
                "doctor {} slot {} - {} collides with {:?}",
                doctor_id,
                start,
                end,
                found.iter().map(|a| a.id).collect::<Vec<_>>()
            );
        }
        Ok(found)
    }

    pub async fn has_conflict(
        &self,
        doctor_id: ActorId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<AppointmentId>,
    ) -> ClinicResult<bool> {
        Ok(!self.conflicts(doctor_id, start, end, exclude).await?.is_empty())
    }

    /// `Err(Conflict)` when the slot is taken
    pub async fn ensure_free(
        &self,
        doctor_id: ActorId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<AppointmentId>,
    ) -> ClinicResult<()> {
        if self.has_conflict(doctor_id, start, end, exclude).await? {
            return Err(ClinicError::Conflict);
        }
        Ok(())
    }
}
