//! Clinic Shared Utilities
//!
//! This crate provides common functionality for the clinic crates:
//! - Identity and role resolution
//! - Access control enforcement
//! - Audit logging
//! - Common types, error taxonomy and pagination
//! - Field validation helpers
//! - Configuration (`config`)

use serde::{Deserialize, Serialize};

// Re-export commonly used items
pub use access_control::*;
pub use audit::*;
pub use types::*;
pub use validation::*;

/// Clinic configuration loaded from defaults, an optional file and the environment
pub mod config;

/// Access control module - role resolution and per-operation authorization
pub mod access_control {
    use super::*;
    use chrono::{DateTime, NaiveDate, Utc};
    use log::debug;

    /// Patient profile attached to an actor
    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
    pub struct PatientProfile {
        pub id: PatientId,
        /// Actor owning this profile (one-to-one)
        pub actor_id: ActorId,
        pub phone: String,
        pub birth_date: Option<NaiveDate>,
        pub address: String,
        pub created_at: DateTime<Utc>,
    }

    /// Authenticated identity interacting with the clinic
    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
    pub struct Actor {
        pub id: ActorId,
        pub username: String,
        pub full_name: String,
        pub email: Option<String>,
        /// Presence of a profile makes the actor a patient
        pub patient_profile: Option<PatientProfile>,
    }

    impl Actor {
        /// Create an actor without a patient profile (doctor or administrator)
        pub fn new(id: ActorId, username: impl Into<String>) -> Self {
            Self {
                id,
                username: username.into(),
                full_name: String::new(),
                email: None,
                patient_profile: None,
            }
        }

        pub fn with_full_name(mut self, full_name: impl Into<String>) -> Self {
            self.full_name = full_name.into();
            self
        }

        pub fn with_patient_profile(mut self, profile: PatientProfile) -> Self {
            self.patient_profile = Some(profile);
            self
        }

        /// Full name when set, username otherwise
        pub fn display_name(&self) -> &str {
            if self.full_name.trim().is_empty() {
                &self.username
            } else {
                &self.full_name
            }
        }
    }

    /// Role derived from profile attachment, never stored
    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
    pub enum Role {
        Patient(PatientProfile),
        DoctorOrAdmin,
    }

    impl Role {
        pub fn is_patient(&self) -> bool {
            matches!(self, Role::Patient(_))
        }

        pub fn patient_profile(&self) -> Option<&PatientProfile> {
            match self {
                Role::Patient(profile) => Some(profile),
                Role::DoctorOrAdmin => None,
            }
        }
    }

    impl std::fmt::Display for Role {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Role::Patient(_) => write!(f, "Patient"),
                Role::DoctorOrAdmin => write!(f, "DoctorOrAdmin"),
            }
        }
    }

    /// Resolve the role of an actor. Absence of a profile is a valid state.
    pub fn role_of(actor: &Actor) -> Role {
        match &actor.patient_profile {
            Some(profile) => Role::Patient(profile.clone()),
            None => Role::DoctorOrAdmin,
        }
    }

    /// Doctor and patient an appointment belongs to
    #[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
    pub struct AppointmentOwnership {
        pub doctor_id: ActorId,
        pub patient_id: PatientId,
    }

    /// Operations guarded by the authorization gate
    #[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
    pub enum Operation {
        CreateAppointment,
        EditAppointment,
        SetStatus,
        ConfirmAppointment,
        CancelAppointment,
        ManageRecords,
        ViewAppointment,
        ExportPrescriptions,
        EmailPrescriptions,
        ViewAgenda,
        ViewDashboard,
        ViewHistory,
    }

    /// Who may perform an operation
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum AccessRule {
        /// Any doctor or administrator
        DoctorOrAdmin,
        /// Any patient, scoped to their own data by the caller
        Patient,
        /// The doctor referenced by the appointment
        OwningDoctor,
        /// The patient referenced by the appointment
        OwningPatient,
        /// Either the owning doctor or the owning patient
        OwningParticipant,
    }

    impl Operation {
        pub fn rule(&self) -> AccessRule {
            match self {
                Operation::CreateAppointment | Operation::ViewAgenda | Operation::ViewDashboard => {
                    AccessRule::DoctorOrAdmin
                }
                Operation::ViewHistory => AccessRule::Patient,
                Operation::EditAppointment
                | Operation::SetStatus
                | Operation::ManageRecords
                | Operation::EmailPrescriptions => AccessRule::OwningDoctor,
                Operation::ConfirmAppointment | Operation::CancelAppointment => {
                    AccessRule::OwningPatient
                }
                Operation::ViewAppointment | Operation::ExportPrescriptions => {
                    AccessRule::OwningParticipant
                }
            }
        }
    }

    /// Role-only part of an operation's rule, checked before any lookup so a
    /// patient never learns whether a doctor-only target exists.
    pub fn authorize_role(actor: &Actor, role: &Role, operation: Operation) -> ClinicResult<()> {
        let allowed = match (operation.rule(), role) {
            (AccessRule::DoctorOrAdmin | AccessRule::OwningDoctor, Role::DoctorOrAdmin) => true,
            (AccessRule::Patient | AccessRule::OwningPatient, Role::Patient(_)) => true,
            (AccessRule::OwningParticipant, _) => true,
            _ => false,
        };
        if allowed {
            Ok(())
        } else {
            debug!(
                "access denied: actor {} ({}) {:?}: wrong role",
                actor.id, role, operation
            );
            Err(ClinicError::PermissionDenied)
        }
    }

    /// Check that `actor` (resolved to `role`) may perform `operation`.
    ///
    /// Ownership-scoped rules require `ownership`; without it they deny.
    /// A denial is always reported as `ClinicError::PermissionDenied`; the
    /// failed rule is only written to the debug log.
    pub fn authorize(
        actor: &Actor,
        role: &Role,
        operation: Operation,
        ownership: Option<&AppointmentOwnership>,
    ) -> ClinicResult<()> {
        let owns_as_doctor = |o: &AppointmentOwnership| o.doctor_id == actor.id;
        let owns_as_patient =
            |o: &AppointmentOwnership| matches!(role, Role::Patient(p) if p.id == o.patient_id);

        let decision: Result<(), &'static str> = match (operation.rule(), role) {
            (AccessRule::DoctorOrAdmin, Role::DoctorOrAdmin) => Ok(()),
            (AccessRule::DoctorOrAdmin, Role::Patient(_)) => Err("patients cannot perform this operation"),
            (AccessRule::Patient, Role::Patient(_)) => Ok(()),
            (AccessRule::Patient, Role::DoctorOrAdmin) => Err("only patients can perform this operation"),
            (AccessRule::OwningDoctor, Role::Patient(_)) => Err("patients cannot perform this operation"),
            (AccessRule::OwningDoctor, Role::DoctorOrAdmin) => match ownership {
                Some(o) if owns_as_doctor(o) => Ok(()),
                _ => Err("actor is not the appointment's doctor"),
            },
            (AccessRule::OwningPatient, Role::DoctorOrAdmin) => Err("only patients can perform this operation"),
            (AccessRule::OwningPatient, Role::Patient(_)) => match ownership {
                Some(o) if owns_as_patient(o) => Ok(()),
                _ => Err("actor is not the appointment's patient"),
            },
            (AccessRule::OwningParticipant, Role::DoctorOrAdmin) => match ownership {
                Some(o) if owns_as_doctor(o) => Ok(()),
                _ => Err("actor is not the appointment's doctor"),
            },
            (AccessRule::OwningParticipant, Role::Patient(_)) => match ownership {
                Some(o) if owns_as_patient(o) => Ok(()),
                _ => Err("actor is not the appointment's patient"),
            },
        };

        decision.map_err(|reason| {
            debug!(
                "access denied: actor {} ({}) {:?}: {}",
                actor.id, role, operation, reason
            );
            ClinicError::PermissionDenied
        })
    }
}

/// Audit logging module - one entry per successful mutation or export
pub mod audit {
    use super::*;
    use chrono::{DateTime, Utc};
    use log::{info, warn};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    /// Process-wide sequence keeping log ids unique under a frozen clock
    static NEXT_LOG_SEQ: AtomicU64 = AtomicU64::new(1);

    /// Action recorded in the audit trail
    #[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    pub enum AuditAction {
        Create,
        Update,
        Delete,
        Status,
        Pdf,
        Email,
    }

    impl std::fmt::Display for AuditAction {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                AuditAction::Create => write!(f, "CREATE"),
                AuditAction::Update => write!(f, "UPDATE"),
                AuditAction::Delete => write!(f, "DELETE"),
                AuditAction::Status => write!(f, "STATUS"),
                AuditAction::Pdf => write!(f, "PDF"),
                AuditAction::Email => write!(f, "EMAIL"),
            }
        }
    }

    /// Kind of object an audit entry refers to
    #[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
    pub enum ObjectType {
        Appointment,
        ClinicalNote,
        Prescription,
        AppointmentFile,
        MedicalFile,
    }

    impl std::fmt::Display for ObjectType {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                ObjectType::Appointment => write!(f, "Appointment"),
                ObjectType::ClinicalNote => write!(f, "ClinicalNote"),
                ObjectType::Prescription => write!(f, "Prescription"),
                ObjectType::AppointmentFile => write!(f, "AppointmentFile"),
                ObjectType::MedicalFile => write!(f, "MedicalFile"),
            }
        }
    }

    /// Audit trail entry
    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
    pub struct AuditEntry {
        pub log_id: String,
        pub actor_id: ActorId,
        pub action: AuditAction,
        pub object_type: ObjectType,
        pub object_id: u64,
        pub appointment_id: Option<AppointmentId>,
        pub message: String,
        pub timestamp: DateTime<Utc>,
    }

    impl AuditEntry {
        pub fn new(
            actor_id: ActorId,
            action: AuditAction,
            object_type: ObjectType,
            object_id: u64,
            appointment_id: Option<AppointmentId>,
            message: impl Into<String>,
            timestamp: DateTime<Utc>,
        ) -> Self {
            Self {
                log_id: format!(
                    "AUD-{}-{}-{}",
                    timestamp.timestamp_micros(),
                    actor_id,
                    NEXT_LOG_SEQ.fetch_add(1, Ordering::Relaxed)
                ),
                actor_id,
                action,
                object_type,
                object_id,
                appointment_id,
                message: message.into(),
                timestamp,
            }
        }
    }

    #[derive(Clone, Debug, PartialEq, thiserror::Error)]
    pub enum AuditError {
        #[error("audit sink unavailable: {0}")]
        Unavailable(String),
    }

    /// Destination for audit entries
    pub trait AuditSink: Send + Sync {
        fn record(&self, entry: &AuditEntry) -> Result<(), AuditError>;
    }

    /// Fire-and-forget write: sink failures are logged and never surface
    pub fn record_audit(sink: &dyn AuditSink, entry: AuditEntry) {
        if let Err(err) = sink.record(&entry) {
            warn!(
                "dropping audit entry {} ({} {} #{}): {}",
                entry.log_id, entry.action, entry.object_type, entry.object_id, err
            );
        }
    }

    /// Writes entries to the `clinic::audit` log target
    #[derive(Clone, Debug, Default)]
    pub struct LogAuditSink;

    impl AuditSink for LogAuditSink {
        fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
            let appointment = entry
                .appointment_id
                .map(|id| format!(" | appointment #{}", id))
                .unwrap_or_default();
            info!(
                target: "clinic::audit",
                "[{}] actor {} -> {} {} #{}{}: {}",
                entry.timestamp.to_rfc3339(),
                entry.actor_id,
                entry.action,
                entry.object_type,
                entry.object_id,
                appointment,
                entry.message
            );
            Ok(())
        }
    }

    /// Keeps entries in memory, for tests and the replay tool
    #[derive(Debug, Default)]
    pub struct MemoryAuditSink {
        entries: Mutex<Vec<AuditEntry>>,
    }

    impl MemoryAuditSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn entries(&self) -> Vec<AuditEntry> {
            self.entries
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone()
        }

        pub fn len(&self) -> usize {
            self.entries
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    impl AuditSink for MemoryAuditSink {
        fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
            self.entries
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(entry.clone());
            Ok(())
        }
    }
}

/// Common types used across the clinic crates
pub mod types {
    use super::*;
    use chrono::{DateTime, Utc};
    use derive_more::{Display, From, Into};
    use std::sync::RwLock;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, From, Into)]
    #[serde(transparent)]
    pub struct ActorId(pub u64);

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, From, Into)]
    #[serde(transparent)]
    pub struct PatientId(pub u64);

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, From, Into)]
    #[serde(transparent)]
    pub struct AppointmentId(pub u64);

    /// Id of a child record (note, prescription, file)
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, From, Into)]
    #[serde(transparent)]
    pub struct RecordId(pub u64);

    /// Entities that can be reported as missing
    #[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
    pub enum EntityKind {
        Actor,
        Patient,
        Appointment,
        ClinicalNote,
        Prescription,
        AppointmentFile,
        MedicalFile,
    }

    impl std::fmt::Display for EntityKind {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                EntityKind::Actor => write!(f, "actor"),
                EntityKind::Patient => write!(f, "patient"),
                EntityKind::Appointment => write!(f, "appointment"),
                EntityKind::ClinicalNote => write!(f, "clinical note"),
                EntityKind::Prescription => write!(f, "prescription"),
                EntityKind::AppointmentFile => write!(f, "appointment file"),
                EntityKind::MedicalFile => write!(f, "medical file"),
            }
        }
    }

    /// Error taxonomy shared by every clinic operation
    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq, thiserror::Error)]
    pub enum ClinicError {
        #[error("validation failed: {}", join_field_errors(.0))]
        Validation(Vec<FieldError>),
        #[error("the requested time overlaps another appointment for this doctor")]
        Conflict,
        /// Never carries the failed rule
        #[error("not authorized")]
        PermissionDenied,
        #[error("{entity} {id} not found")]
        NotFound { entity: EntityKind, id: u64 },
        #[error("storage error: {0}")]
        Storage(String),
        /// Rendering or notification collaborator failed
        #[error("delivery failed: {0}")]
        Delivery(String),
    }

    fn join_field_errors(errors: &[FieldError]) -> String {
        errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Stable classification of a `ClinicError` for callers
    #[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    pub enum ErrorKind {
        ValidationError,
        Conflict,
        PermissionDenied,
        NotFound,
        StorageError,
        DeliveryError,
    }

    impl std::fmt::Display for ErrorKind {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                ErrorKind::ValidationError => write!(f, "VALIDATION_ERROR"),
                ErrorKind::Conflict => write!(f, "CONFLICT"),
                ErrorKind::PermissionDenied => write!(f, "PERMISSION_DENIED"),
                ErrorKind::NotFound => write!(f, "NOT_FOUND"),
                ErrorKind::StorageError => write!(f, "STORAGE_ERROR"),
                ErrorKind::DeliveryError => write!(f, "DELIVERY_ERROR"),
            }
        }
    }

    impl ClinicError {
        pub fn kind(&self) -> ErrorKind {
            match self {
                ClinicError::Validation(_) => ErrorKind::ValidationError,
                ClinicError::Conflict => ErrorKind::Conflict,
                ClinicError::PermissionDenied => ErrorKind::PermissionDenied,
                ClinicError::NotFound { .. } => ErrorKind::NotFound,
                ClinicError::Storage(_) => ErrorKind::StorageError,
                ClinicError::Delivery(_) => ErrorKind::DeliveryError,
            }
        }

        pub fn not_found(entity: EntityKind, id: impl Into<u64>) -> Self {
            ClinicError::NotFound {
                entity,
                id: id.into(),
            }
        }

        /// Single-field validation failure
        pub fn invalid(field: &str, message: &str, code: ValidationErrorCode) -> Self {
            ClinicError::Validation(vec![FieldError::new(field, message, code)])
        }

        /// Validation codes carried by this error, empty for other kinds
        pub fn validation_codes(&self) -> Vec<ValidationErrorCode> {
            match self {
                ClinicError::Validation(errors) => errors.iter().map(|e| e.code).collect(),
                _ => Vec::new(),
            }
        }
    }

    pub type ClinicResult<T> = Result<T, ClinicError>;

    /// Input for paginated queries
    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
    pub struct PaginationInput {
        pub offset: usize,
        pub limit: usize,
    }

    impl PaginationInput {
        pub const MAX_LIMIT: usize = 100;

        /// Window for a 1-based page number. Missing, zero or out-of-range
        /// pages clamp to the nearest valid page.
        pub fn for_page(page: Option<usize>, per_page: usize, total: usize) -> Self {
            let per_page = per_page.clamp(1, Self::MAX_LIMIT);
            let num_pages = total.div_ceil(per_page).max(1);
            let page = page.unwrap_or(1).clamp(1, num_pages);
            Self {
                offset: (page - 1) * per_page,
                limit: per_page,
            }
        }
    }

    /// Result wrapper for paginated queries
    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
    pub struct PaginatedResult<T> {
        pub items: Vec<T>,
        pub total: usize,
        pub offset: usize,
        pub limit: usize,
        pub has_more: bool,
    }

    impl<T> PaginatedResult<T> {
        pub fn new(items: Vec<T>, total: usize, pagination: &PaginationInput) -> Self {
            Self {
                has_more: pagination.offset + items.len() < total,
                items,
                total,
                offset: pagination.offset,
                limit: pagination.limit,
            }
        }

        pub fn empty(pagination: &PaginationInput) -> Self {
            Self {
                items: Vec::new(),
                total: 0,
                offset: pagination.offset,
                limit: pagination.limit,
                has_more: false,
            }
        }

        /// Slice an already ordered collection
        pub fn paginate(all: Vec<T>, pagination: &PaginationInput) -> Self {
            let total = all.len();
            if pagination.offset >= total {
                return Self::empty(pagination).with_total(total);
            }
            let items: Vec<T> = all
                .into_iter()
                .skip(pagination.offset)
                .take(pagination.limit)
                .collect();
            Self::new(items, total, pagination)
        }

        fn with_total(mut self, total: usize) -> Self {
            self.total = total;
            self
        }
    }

    /// Source of the current instant
    pub trait Clock: Send + Sync {
        fn now(&self) -> DateTime<Utc>;
    }

    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Clock pinned to a settable instant
    #[derive(Debug)]
    pub struct FixedClock {
        instant: RwLock<DateTime<Utc>>,
    }

    impl FixedClock {
        pub fn new(instant: DateTime<Utc>) -> Self {
            Self {
                instant: RwLock::new(instant),
            }
        }

        pub fn set(&self, instant: DateTime<Utc>) {
            *self
                .instant
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) = instant;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self
                .instant
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
        }
    }
}

/// Field validation with accumulated, per-field errors
pub mod validation {
    use super::*;

    /// Validation error with detailed context
    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
    pub struct FieldError {
        pub field: String,
        pub message: String,
        pub code: ValidationErrorCode,
    }

    impl FieldError {
        pub fn new(field: &str, message: &str, code: ValidationErrorCode) -> Self {
            Self {
                field: field.to_string(),
                message: message.to_string(),
                code,
            }
        }
    }

    /// Specific validation error codes for programmatic handling
    #[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
    pub enum ValidationErrorCode {
        Required,
        InvalidFormat,
        OutOfRange,
        TooLong,
        /// Referenced by other records (protect-on-delete)
        InvalidReference,
        /// Status change not allowed from the current state
        InvalidTransition,
    }

    impl std::fmt::Display for FieldError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}: {} ({:?})", self.field, self.message, self.code)
        }
    }

    /// Validation result that can accumulate multiple errors
    #[derive(Clone, Debug, Default)]
    pub struct ValidationResult {
        pub errors: Vec<FieldError>,
    }

    impl ValidationResult {
        pub fn new() -> Self {
            Self { errors: Vec::new() }
        }

        pub fn add_error(&mut self, field: &str, message: &str, code: ValidationErrorCode) {
            self.errors.push(FieldError::new(field, message, code));
        }

        pub fn is_valid(&self) -> bool {
            self.errors.is_empty()
        }

        pub fn into_result(self) -> ClinicResult<()> {
            if self.is_valid() {
                Ok(())
            } else {
                Err(ClinicError::Validation(self.errors))
            }
        }

        /// Record `TooLong` when `value` exceeds `max` characters
        pub fn check_max_len(&mut self, field: &str, value: &str, max: usize) {
            if value.chars().count() > max {
                self.add_error(
                    field,
                    &format!("must be at most {} characters", max),
                    ValidationErrorCode::TooLong,
                );
            }
        }

        /// Record `Required` when `value` is blank
        pub fn check_not_blank(&mut self, field: &str, value: &str) {
            if value.trim().is_empty() {
                self.add_error(field, "is required", ValidationErrorCode::Required);
            }
        }

        /// Record `Required` when `value` is absent
        pub fn check_present<T>(&mut self, field: &str, value: &Option<T>) {
            if value.is_none() {
                self.add_error(field, "is required", ValidationErrorCode::Required);
            }
        }
    }
}
