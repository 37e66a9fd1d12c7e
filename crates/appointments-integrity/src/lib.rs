//! Appointments Integrity
//!
//! Defines entry types for clinic scheduling including:
//! - Appointments and their status literals
//! - Clinical notes, prescriptions and attached files
//! - Input validation for every entry
//!
//! Intervals are half-open: `[start_time, end_time)`.

use chrono::{DateTime, Utc};
use clinic_shared::{
    ActorId, AppointmentId, AppointmentOwnership, ClinicError, ClinicResult, EntityKind,
    ObjectType, PatientId, PatientProfile, RecordId, ValidationErrorCode, ValidationResult,
};
use serde::{Deserialize, Serialize};

pub const MAX_REASON_LEN: usize = 255;
pub const MAX_MEDICATION_LEN: usize = 200;
pub const MAX_DOSAGE_FIELD_LEN: usize = 120;
pub const MAX_FILE_TITLE_LEN: usize = 120;
pub const MAX_PHONE_LEN: usize = 20;

// ============================================================================
// Appointment Types
// ============================================================================

/// Appointment status
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    /// Created, awaiting confirmation
    #[default]
    Pending,
    Confirmed,
    Cancelled,
    /// Visit finished
    Done,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 4] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "PENDING",
            AppointmentStatus::Confirmed => "CONFIRMED",
            AppointmentStatus::Cancelled => "CANCELLED",
            AppointmentStatus::Done => "DONE",
        }
    }

    /// Parse an exact status literal
    pub fn from_literal(literal: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == literal)
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AppointmentStatus {
    type Err = ClinicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_literal(s).ok_or_else(|| {
            ClinicError::invalid(
                "status",
                &format!("'{}' is not a valid status", s),
                ValidationErrorCode::InvalidFormat,
            )
        })
    }
}

/// Appointment record
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: AppointmentId,
    pub patient_id: PatientId,
    /// Doctor/admin actor whose calendar holds this appointment
    pub doctor_id: ActorId,
    pub start_time: DateTime<Utc>,
    /// Always after `start_time`
    pub end_time: DateTime<Utc>,
    /// Free-text reason, may be blank
    pub reason: String,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    /// Half-open overlap with `[start, end)`
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        intervals_overlap(self.start_time, self.end_time, start, end)
    }

    pub fn ownership(&self) -> AppointmentOwnership {
        AppointmentOwnership {
            doctor_id: self.doctor_id,
            patient_id: self.patient_id,
        }
    }
}

/// Form-shaped input for creating or editing an appointment
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppointmentInput {
    pub patient_id: Option<PatientId>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub reason: String,
    /// Status literal; absent keeps the current status (PENDING on create)
    pub status: Option<String>,
}

/// Appointment input that passed validation
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedAppointment {
    pub patient_id: PatientId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub reason: String,
    pub status: Option<AppointmentStatus>,
}

/// Two half-open intervals overlap iff `s1 < e2 && s2 < e1`
pub fn intervals_overlap(
    s1: DateTime<Utc>,
    e1: DateTime<Utc>,
    s2: DateTime<Utc>,
    e2: DateTime<Utc>,
) -> bool {
    s1 < e2 && s2 < e1
}

/// Reject empty or inverted ranges
pub fn validate_time_range(start: DateTime<Utc>, end: DateTime<Utc>) -> ClinicResult<()> {
    if end <= start {
        return Err(ClinicError::invalid(
            "end_time",
            "End time must be after start time",
            ValidationErrorCode::OutOfRange,
        ));
    }
    Ok(())
}

/// Validate a create/edit payload. All field errors are reported together.
pub fn validate_appointment_input(input: &AppointmentInput) -> ClinicResult<ValidatedAppointment> {
    let mut result = ValidationResult::new();
    result.check_present("patient_id", &input.patient_id);
    result.check_present("start_time", &input.start_time);
    result.check_present("end_time", &input.end_time);
    result.check_max_len("reason", &input.reason, MAX_REASON_LEN);

    let status = match input.status.as_deref() {
        None => None,
        Some(literal) => match AppointmentStatus::from_literal(literal) {
            Some(status) => Some(status),
            None => {
                result.add_error(
                    "status",
                    &format!("'{}' is not a valid status", literal),
                    ValidationErrorCode::InvalidFormat,
                );
                None
            }
        },
    };

    if let (Some(start), Some(end)) = (input.start_time, input.end_time) {
        if let Err(ClinicError::Validation(errors)) = validate_time_range(start, end) {
            result.errors.extend(errors);
        }
    }

    result.into_result()?;

    match (input.patient_id, input.start_time, input.end_time) {
        (Some(patient_id), Some(start_time), Some(end_time)) => Ok(ValidatedAppointment {
            patient_id,
            start_time,
            end_time,
            reason: input.reason.clone(),
            status,
        }),
        _ => Err(ClinicError::invalid(
            "appointment",
            "is incomplete",
            ValidationErrorCode::Required,
        )),
    }
}

/// Entry-level invariants checked before any appointment is persisted
pub fn validate_appointment(appointment: &Appointment) -> ClinicResult<()> {
    validate_time_range(appointment.start_time, appointment.end_time)?;
    let mut result = ValidationResult::new();
    result.check_max_len("reason", &appointment.reason, MAX_REASON_LEN);
    result.into_result()
}

/// Contact fields of a patient profile
pub fn validate_patient_profile(profile: &PatientProfile) -> ClinicResult<()> {
    let mut result = ValidationResult::new();
    result.check_max_len("phone", &profile.phone, MAX_PHONE_LEN);
    result.into_result()
}

// ============================================================================
// Clinical Child Records
// ============================================================================

/// Opaque reference to stored file bytes (storage itself is external)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct FileRef(pub String);

/// Clinical note written during an appointment
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ClinicalNote {
    pub id: RecordId,
    pub appointment_id: AppointmentId,
    pub author_id: ActorId,
    pub content: String,
    /// Only visible notes are shown to the patient
    pub visible_to_patient: bool,
    pub created_at: DateTime<Utc>,
}

/// Medication prescribed for an appointment
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Prescription {
    pub id: RecordId,
    pub appointment_id: AppointmentId,
    pub medication: Option<String>,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

/// File attached alongside prescriptions (e.g. X-rays)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AppointmentFile {
    pub id: RecordId,
    pub appointment_id: AppointmentId,
    pub title: String,
    pub file: FileRef,
    pub created_at: DateTime<Utc>,
}

/// Lab or imaging document uploaded for an appointment
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MedicalFile {
    pub id: RecordId,
    pub appointment_id: AppointmentId,
    pub uploaded_by: ActorId,
    pub title: String,
    pub file: FileRef,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NoteInput {
    pub content: String,
    pub visible_to_patient: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PrescriptionInput {
    pub medication: Option<String>,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub notes: String,
}

/// Upload metadata shared by both file kinds
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileInput {
    pub title: String,
    pub file: Option<FileRef>,
}

pub fn validate_note_input(input: &NoteInput) -> ClinicResult<()> {
    let mut result = ValidationResult::new();
    result.check_not_blank("content", &input.content);
    result.into_result()
}

pub fn validate_prescription_input(input: &PrescriptionInput) -> ClinicResult<()> {
    let mut result = ValidationResult::new();
    if let Some(medication) = &input.medication {
        result.check_max_len("medication", medication, MAX_MEDICATION_LEN);
    }
    result.check_max_len("dosage", &input.dosage, MAX_DOSAGE_FIELD_LEN);
    result.check_max_len("frequency", &input.frequency, MAX_DOSAGE_FIELD_LEN);
    result.check_max_len("duration", &input.duration, MAX_DOSAGE_FIELD_LEN);
    result.into_result()
}

pub fn validate_file_input(input: &FileInput) -> ClinicResult<FileRef> {
    let mut result = ValidationResult::new();
    result.check_max_len("title", &input.title, MAX_FILE_TITLE_LEN);
    match &input.file {
        Some(file) => result.check_not_blank("file", &file.0),
        None => result.check_present("file", &input.file),
    }
    result.into_result()?;
    input.file.clone().ok_or_else(|| {
        ClinicError::invalid("file", "is required", ValidationErrorCode::Required)
    })
}

/// Kind of child record, used to address deletions
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum RecordKind {
    ClinicalNote,
    Prescription,
    AppointmentFile,
    MedicalFile,
}

impl RecordKind {
    pub fn object_type(&self) -> ObjectType {
        match self {
            RecordKind::ClinicalNote => ObjectType::ClinicalNote,
            RecordKind::Prescription => ObjectType::Prescription,
            RecordKind::AppointmentFile => ObjectType::AppointmentFile,
            RecordKind::MedicalFile => ObjectType::MedicalFile,
        }
    }

    pub fn entity_kind(&self) -> EntityKind {
        match self {
            RecordKind::ClinicalNote => EntityKind::ClinicalNote,
            RecordKind::Prescription => EntityKind::Prescription,
            RecordKind::AppointmentFile => EntityKind::AppointmentFile,
            RecordKind::MedicalFile => EntityKind::MedicalFile,
        }
    }
}

/// Any child record of an appointment
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum ChildRecord {
    ClinicalNote(ClinicalNote),
    Prescription(Prescription),
    AppointmentFile(AppointmentFile),
    MedicalFile(MedicalFile),
}

impl ChildRecord {
    pub fn id(&self) -> RecordId {
        match self {
            ChildRecord::ClinicalNote(r) => r.id,
            ChildRecord::Prescription(r) => r.id,
            ChildRecord::AppointmentFile(r) => r.id,
            ChildRecord::MedicalFile(r) => r.id,
        }
    }

    /// Replace the id, used by stores assigning ids on insert
    pub fn with_id(mut self, id: RecordId) -> Self {
        match &mut self {
            ChildRecord::ClinicalNote(r) => r.id = id,
            ChildRecord::Prescription(r) => r.id = id,
            ChildRecord::AppointmentFile(r) => r.id = id,
            ChildRecord::MedicalFile(r) => r.id = id,
        }
        self
    }

    pub fn appointment_id(&self) -> AppointmentId {
        match self {
            ChildRecord::ClinicalNote(r) => r.appointment_id,
            ChildRecord::Prescription(r) => r.appointment_id,
            ChildRecord::AppointmentFile(r) => r.appointment_id,
            ChildRecord::MedicalFile(r) => r.appointment_id,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            ChildRecord::ClinicalNote(r) => r.created_at,
            ChildRecord::Prescription(r) => r.created_at,
            ChildRecord::AppointmentFile(r) => r.created_at,
            ChildRecord::MedicalFile(r) => r.created_at,
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            ChildRecord::ClinicalNote(_) => RecordKind::ClinicalNote,
            ChildRecord::Prescription(_) => RecordKind::Prescription,
            ChildRecord::AppointmentFile(_) => RecordKind::AppointmentFile,
            ChildRecord::MedicalFile(_) => RecordKind::MedicalFile,
        }
    }
}
