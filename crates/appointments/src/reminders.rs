use appointments_integrity::{Appointment, AppointmentStatus};
use chrono::{DateTime, Duration, Utc};
use clinic_shared::{ClinicError, ClinicResult, ValidationErrorCode};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::documents::OutgoingMessage;
use crate::gate::AppointmentService;
use crate::repository::AppointmentFilter;

/// Confirmation reminder for an upcoming appointment
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Reminder {
    pub appointment: Appointment,
    pub message: OutgoingMessage,
}

impl AppointmentService {
    /// Open appointments starting within the reminder window after `now`.
    /// Patients without an e-mail address are skipped.
    pub async fn due_reminders(&self, now: DateTime<Utc>) -> ClinicResult<Vec<Reminder>> {
        let after = |instant: DateTime<Utc>, hours: i64| {
            Duration::try_hours(hours).and_then(|d| instant.checked_add_signed(d))
        };
        let Some((from, until)) = after(now, self.config.reminder_lead_hours)
            .and_then(|from| Some((from, after(from, self.config.reminder_window_hours)?)))
        else {
            return Err(ClinicError::invalid(
                "reminder_window_hours",
                "reminder window falls outside the supported time range",
                ValidationErrorCode::OutOfRange,
            ));
        };
        let filter = AppointmentFilter::default()
            .with_statuses(&[AppointmentStatus::Pending, AppointmentStatus::Confirmed]);

        let mut candidates: Vec<Appointment> = self
            .appointments
            .list(&filter)
            .await?
            .into_iter()
            // Both ends inclusive
            .filter(|a| a.start_time >= from && a.start_time <= until)
            .collect();
        candidates.reverse();

        let mut due = Vec::with_capacity(candidates.len());
        for appointment in candidates {
            let Some(patient) = self.patients.actor_for_patient(appointment.patient_id).await? else {
                continue;
            };
            let Some(to) = patient.email.clone().filter(|e| !e.trim().is_empty()) else {
                continue;
            };
            let message = OutgoingMessage {
                to,
                subject: "Appointment confirmation".to_string(),
                body: format!(
                    "Hello {}. Your appointment is on {}. Reply to confirm.",
                    patient.display_name(),
                    self.config.format_local(appointment.start_time)
                ),
                attachment: None,
            };
            due.push(Reminder {
                appointment,
                message,
            });
        }
        Ok(due)
    }

    /// Deliver due reminders; failures are logged and skipped. Returns the number sent.
    pub async fn send_reminders(&self, now: DateTime<Utc>) -> ClinicResult<usize> {
        let mut sent = 0;
        for reminder in self.due_reminders(now).await? {
            let id = reminder.appointment.id;
            match self.notifier.send(reminder.message).await {
                Ok(()) => sent += 1,
                Err(err) => warn!("reminder for appointment {} not sent: {}", id, err),
            }
        }
        info!("sent {} appointment reminder(s)", sent);
        Ok(sent)
    }
}
