//! Prescription documents and outbound messages
//!
//! Rendering and delivery are collaborators behind [`DocumentRenderer`] and
//! [`NotificationSink`]; the crate ships a plain-text renderer and log/memory
//! sinks. Real PDF generation and SMTP live outside the core.

use appointments_integrity::{Appointment, ChildRecord, Prescription};
use async_trait::async_trait;
use clinic_shared::{
    role_of, Actor, AppointmentId, AuditAction, ClinicError, ClinicResult, EntityKind, ObjectType,
    Operation, ValidationErrorCode,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as TokioMutex;

use crate::gate::AppointmentService;

const BLANK: &str = "-";

// ============================================================================
// Document Model
// ============================================================================

/// One prescribed medication as printed
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PrescriptionLine {
    pub medication: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub notes: String,
}

impl From<&Prescription> for PrescriptionLine {
    fn from(rx: &Prescription) -> Self {
        fn or_blank(value: &str) -> String {
            if value.trim().is_empty() {
                BLANK.to_string()
            } else {
                value.trim().to_string()
            }
        }
        Self {
            medication: or_blank(rx.medication.as_deref().unwrap_or_default()),
            dosage: or_blank(&rx.dosage),
            frequency: or_blank(&rx.frequency),
            duration: or_blank(&rx.duration),
            notes: rx.notes.trim().to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PrescriptionDocument {
    pub appointment_id: AppointmentId,
    pub title: String,
    pub patient_name: String,
    /// Local start date-time, `YYYY-MM-DD HH:MM`
    pub scheduled_for: String,
    /// Newest prescription first
    pub lines: Vec<PrescriptionLine>,
}

impl PrescriptionDocument {
    pub fn new(
        appointment: &Appointment,
        patient_name: &str,
        scheduled_for: String,
        prescriptions: &[Prescription],
    ) -> Self {
        Self {
            appointment_id: appointment.id,
            title: format!("Prescription - Appointment #{}", appointment.id),
            patient_name: patient_name.to_string(),
            scheduled_for,
            lines: prescriptions.iter().map(PrescriptionLine::from).collect(),
        }
    }

    pub fn file_name(&self, extension: &str) -> String {
        format!("prescription_appointment_{}.{}", self.appointment_id, extension)
    }
}

/// Rendered bytes ready for download or attachment
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RenderedDocument {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum DocumentError {
    #[error("failed to render document: {0}")]
    Render(String),
}

pub trait DocumentRenderer: Send + Sync {
    fn render(&self, document: &PrescriptionDocument) -> Result<RenderedDocument, DocumentError>;
}

/// UTF-8 text layout of a prescription
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainTextRenderer;

impl DocumentRenderer for PlainTextRenderer {
    fn render(&self, document: &PrescriptionDocument) -> Result<RenderedDocument, DocumentError> {
        let mut out = String::new();
        out.push_str(&document.title);
        out.push('\n');
        out.push_str(&format!("Patient: {}\n", document.patient_name));
        out.push_str(&format!("Date: {}\n\n", document.scheduled_for));

        if document.lines.is_empty() {
            out.push_str("No medications recorded.\n");
        }
        for line in &document.lines {
            out.push_str(&format!(
                "- {} | Dosage: {} | Frequency: {} | Duration: {}\n",
                line.medication, line.dosage, line.frequency, line.duration
            ));
            if !line.notes.is_empty() {
                out.push_str(&format!("  Notes: {}\n", line.notes));
            }
        }

        Ok(RenderedDocument {
            file_name: document.file_name("txt"),
            content_type: "text/plain; charset=utf-8".to_string(),
            bytes: out.into_bytes(),
        })
    }
}

// ============================================================================
// Notifications
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OutgoingMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<RenderedDocument>,
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum NotificationError {
    #[error("message to {to} not delivered: {reason}")]
    Delivery { to: String, reason: String },
}

/// Outbound mail transport
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, message: OutgoingMessage) -> Result<(), NotificationError>;
}

/// Logs messages instead of sending them
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn send(&self, message: OutgoingMessage) -> Result<(), NotificationError> {
        info!(
            target: "clinic::mail",
            "to={} subject={:?} attachment={:?}",
            message.to,
            message.subject,
            message.attachment.as_ref().map(|a| a.file_name.as_str())
        );
        Ok(())
    }
}

/// Collects messages; can be told to refuse specific recipients
#[derive(Debug, Default)]
pub struct MemoryNotificationSink {
    sent: TokioMutex<Vec<OutgoingMessage>>,
    refused: Vec<String>,
}

impl MemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink failing every delivery to `recipients`
    pub fn refusing<I, S>(recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sent: TokioMutex::new(Vec::new()),
            refused: recipients.into_iter().map(Into::into).collect(),
        }
    }

    pub async fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl NotificationSink for MemoryNotificationSink {
    async fn send(&self, message: OutgoingMessage) -> Result<(), NotificationError> {
        if self.refused.contains(&message.to) {
            return Err(NotificationError::Delivery {
                to: message.to,
                reason: "recipient refused".to_string(),
            });
        }
        self.sent.lock().await.push(message);
        Ok(())
    }
}

// ============================================================================
// Service Operations
// ============================================================================

impl AppointmentService {
    /// Render the prescriptions of an appointment for its doctor or patient
    pub async fn prescription_document(
        &self,
        actor: &Actor,
        id: AppointmentId,
    ) -> ClinicResult<RenderedDocument> {
        let role = role_of(actor);
        let appointment = self
            .authorized_appointment(actor, &role, Operation::ExportPrescriptions, id)
            .await?;

        let rendered = self.render_prescriptions(&appointment).await?;
        self.audit(
            actor,
            AuditAction::Pdf,
            ObjectType::Appointment,
            appointment.id.0,
            Some(appointment.id),
            "downloaded prescription document",
        );
        Ok(rendered)
    }

    /// Mail the prescription document to the patient. Returns the recipient.
    pub async fn email_prescriptions(&self, actor: &Actor, id: AppointmentId) -> ClinicResult<String> {
        let role = role_of(actor);
        let appointment = self
            .authorized_appointment(actor, &role, Operation::EmailPrescriptions, id)
            .await?;

        let patient = self
            .patients
            .actor_for_patient(appointment.patient_id)
            .await?
            .ok_or_else(|| ClinicError::not_found(EntityKind::Patient, appointment.patient_id))?;
        let to = match patient.email.as_deref().map(str::trim) {
            Some(email) if !email.is_empty() => email.to_string(),
            _ => {
                return Err(ClinicError::invalid(
                    "email",
                    "patient has no e-mail address",
                    ValidationErrorCode::Required,
                ))
            }
        };

        let attachment = self.render_prescriptions(&appointment).await?;
        let message = OutgoingMessage {
            to: to.clone(),
            subject: format!("Prescription - Appointment #{}", appointment.id),
            body: format!(
                "Hello {},\n\nAttached is the prescription from your appointment #{}.\n\nRegards,\nThe clinic",
                patient.display_name(),
                appointment.id
            ),
            attachment: Some(attachment),
        };
        self.notifier.send(message).await.map_err(|err| {
            warn!("prescription e-mail for appointment {} failed: {}", appointment.id, err);
            ClinicError::Delivery(err.to_string())
        })?;

        self.audit(
            actor,
            AuditAction::Email,
            ObjectType::Appointment,
            appointment.id.0,
            Some(appointment.id),
            format!("sent prescription by e-mail to {}", to),
        );
        Ok(to)
    }

    async fn render_prescriptions(&self, appointment: &Appointment) -> ClinicResult<RenderedDocument> {
        let patient_name = self
            .patients
            .actor_for_patient(appointment.patient_id)
            .await?
            .map(|actor| actor.display_name().to_string())
            .unwrap_or_else(|| format!("Patient #{}", appointment.patient_id));

        let prescriptions: Vec<Prescription> = self
            .records
            .records_for(appointment.id)
            .await?
            .into_iter()
            .filter_map(|record| match record {
                ChildRecord::Prescription(rx) => Some(rx),
                _ => None,
            })
            .collect();

        let document = PrescriptionDocument::new(
            appointment,
            &patient_name,
            self.config.format_local(appointment.start_time),
            &prescriptions,
        );
        self.renderer
            .render(&document)
            .map_err(|err| ClinicError::Delivery(err.to_string()))
    }
}
