//! Authorization gate for appointment operations
//!
//! Every operation resolves the caller's role once, then checks in order:
//! role, appointment existence, ownership, input validation, referenced
//! patient, and finally the conflict check under the doctor's calendar lock.
//! Nothing is written and nothing is audited unless every check passes.

use std::sync::Arc;

use appointments_integrity::{
    validate_appointment_input, Appointment, AppointmentInput, AppointmentStatus,
};
use clinic_shared::{
    authorize, authorize_role,
    config::{ClinicConfig, ConfigError},
    record_audit, role_of, Actor, ActorId, AppointmentId, AuditAction, AuditEntry, AuditSink,
    ClinicError, ClinicResult, Clock, EntityKind, LogAuditSink, ObjectType, Operation,
    PatientId, PatientProfile, Role, SystemClock,
};
use log::info;

use crate::conflict::ConflictChecker;
use crate::documents::{DocumentRenderer, LogNotificationSink, NotificationSink, PlainTextRenderer};
use crate::repository::{AppointmentRepository, NewAppointment, PatientRepository, RecordRepository};
use crate::status::{PatientAction, StatusPolicy, StatusTransitionEngine};

pub struct AppointmentService {
    pub(crate) appointments: Arc<dyn AppointmentRepository>,
    pub(crate) patients: Arc<dyn PatientRepository>,
    pub(crate) records: Arc<dyn RecordRepository>,
    pub(crate) conflicts: ConflictChecker,
    pub(crate) status: StatusTransitionEngine,
    pub(crate) audit: Arc<dyn AuditSink>,
    pub(crate) notifier: Arc<dyn NotificationSink>,
    pub(crate) renderer: Arc<dyn DocumentRenderer>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: ClinicConfig,
}

impl AppointmentService {
    /// Service over a single store implementing every repository
    pub fn new<S>(store: Arc<S>) -> Self
    where
        S: AppointmentRepository + PatientRepository + RecordRepository + 'static,
    {
        Self::from_parts(store.clone(), store.clone(), store)
    }

    pub fn from_parts(
        appointments: Arc<dyn AppointmentRepository>,
        patients: Arc<dyn PatientRepository>,
        records: Arc<dyn RecordRepository>,
    ) -> Self {
        Self {
            conflicts: ConflictChecker::new(appointments.clone()),
            appointments,
            patients,
            records,
            status: StatusTransitionEngine::default(),
            audit: Arc::new(LogAuditSink),
            notifier: Arc::new(LogNotificationSink),
            renderer: Arc::new(PlainTextRenderer),
            clock: Arc::new(SystemClock),
            config: ClinicConfig::default(),
        }
    }

    /// Apply validated configuration, including the doctor status policy it selects
    pub fn with_config(mut self, config: ClinicConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        self.status = StatusTransitionEngine::from_config(&config);
        self.config = config;
        Ok(self)
    }

    pub fn with_status_policy(mut self, policy: Box<dyn StatusPolicy>) -> Self {
        self.status = StatusTransitionEngine::new(policy);
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn DocumentRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Actor and patient directory backing this service
    pub fn directory(&self) -> &dyn PatientRepository {
        self.patients.as_ref()
    }

    // ========================================================================
    // Appointment Operations
    // ========================================================================

    /// Book an appointment on the calling doctor's calendar
    pub async fn create(&self, actor: &Actor, input: AppointmentInput) -> ClinicResult<Appointment> {
        let role = role_of(actor);
        authorize(actor, &role, Operation::CreateAppointment, None)?;
        let valid = validate_appointment_input(&input)?;
        self.require_patient(valid.patient_id).await?;

        let calendar = self.appointments.lock_calendar(actor.id).await;
        self.conflicts
            .ensure_free(actor.id, valid.start_time, valid.end_time, None)
            .await?;
        let appointment = self
            .appointments
            .insert(
                &calendar,
                NewAppointment {
                    patient_id: valid.patient_id,
                    doctor_id: actor.id,
                    start_time: valid.start_time,
                    end_time: valid.end_time,
                    reason: valid.reason,
                    status: valid.status.unwrap_or_default(),
                    created_at: self.clock.now(),
                },
            )
            .await?;
        drop(calendar);

        info!(
            "doctor {} booked appointment {} for patient {} ({} - {})",
            actor.id, appointment.id, appointment.patient_id, appointment.start_time, appointment.end_time
        );
        self.audit(
            actor,
            AuditAction::Create,
            ObjectType::Appointment,
            appointment.id.0,
            Some(appointment.id),
            "created appointment",
        );
        Ok(appointment)
    }

    /// Full edit by the owning doctor; the appointment stays on their calendar
    pub async fn edit(
        &self,
        actor: &Actor,
        id: AppointmentId,
        input: AppointmentInput,
    ) -> ClinicResult<Appointment> {
        let role = role_of(actor);
        self.authorized_appointment(actor, &role, Operation::EditAppointment, id)
            .await?;
        let valid = validate_appointment_input(&input)?;
        self.require_patient(valid.patient_id).await?;

        let calendar = self.appointments.lock_calendar(actor.id).await;
        let current = self.reload(id).await?;
        authorize(actor, &role, Operation::EditAppointment, Some(&current.ownership()))?;
        let status = match valid.status {
            Some(requested) => self.status.doctor_transition(current.status, requested)?,
            None => current.status,
        };
        self.conflicts
            .ensure_free(actor.id, valid.start_time, valid.end_time, Some(id))
            .await?;
        let updated = self
            .appointments
            .update(
                &calendar,
                Appointment {
                    patient_id: valid.patient_id,
                    doctor_id: actor.id,
                    start_time: valid.start_time,
                    end_time: valid.end_time,
                    reason: valid.reason,
                    status,
                    ..current
                },
            )
            .await?;
        drop(calendar);

        info!("doctor {} edited appointment {}", actor.id, id);
        self.audit(
            actor,
            AuditAction::Update,
            ObjectType::Appointment,
            id.0,
            Some(id),
            "updated appointment",
        );
        Ok(updated)
    }

    /// Set any status literal; unknown literals are a validation error
    pub async fn set_status(
        &self,
        actor: &Actor,
        id: AppointmentId,
        literal: &str,
    ) -> ClinicResult<Appointment> {
        let role = role_of(actor);
        let appointment = self
            .authorized_appointment(actor, &role, Operation::SetStatus, id)
            .await?;
        let requested = StatusTransitionEngine::parse_literal(literal)?;
        self.write_status(
            actor,
            &role,
            Operation::SetStatus,
            appointment.doctor_id,
            id,
            |current| self.status.doctor_transition(current, requested),
        )
        .await
    }

    /// Patient confirmation of their own appointment
    pub async fn confirm(&self, actor: &Actor, id: AppointmentId) -> ClinicResult<Appointment> {
        self.patient_action(actor, id, PatientAction::Confirm).await
    }

    /// Patient cancellation of their own appointment
    pub async fn cancel(&self, actor: &Actor, id: AppointmentId) -> ClinicResult<Appointment> {
        self.patient_action(actor, id, PatientAction::Cancel).await
    }

    async fn patient_action(
        &self,
        actor: &Actor,
        id: AppointmentId,
        action: PatientAction,
    ) -> ClinicResult<Appointment> {
        let operation = match action {
            PatientAction::Confirm => Operation::ConfirmAppointment,
            PatientAction::Cancel => Operation::CancelAppointment,
        };
        let role = role_of(actor);
        let appointment = self.authorized_appointment(actor, &role, operation, id).await?;
        self.write_status(
            actor,
            &role,
            operation,
            appointment.doctor_id,
            id,
            |current| self.status.patient_transition(current, action),
        )
        .await
    }

    /// Re-read and re-authorize under the calendar lock, decide, persist, audit
    async fn write_status<F>(
        &self,
        actor: &Actor,
        role: &Role,
        operation: Operation,
        doctor_id: ActorId,
        id: AppointmentId,
        decide: F,
    ) -> ClinicResult<Appointment>
    where
        F: FnOnce(AppointmentStatus) -> ClinicResult<AppointmentStatus> + Send,
    {
        let calendar = self.appointments.lock_calendar(doctor_id).await;
        let mut appointment = self.reload(id).await?;
        authorize(actor, role, operation, Some(&appointment.ownership()))?;
        let previous = appointment.status;
        appointment.status = decide(previous)?;
        let updated = self.appointments.update(&calendar, appointment).await?;
        drop(calendar);

        info!(
            "appointment {} status {} -> {} by actor {}",
            id, previous, updated.status, actor.id
        );
        self.audit(
            actor,
            AuditAction::Status,
            ObjectType::Appointment,
            id.0,
            Some(id),
            format!("changed status to {}", updated.status),
        );
        Ok(updated)
    }

    // ========================================================================
    // Shared Checks
    // ========================================================================

    /// Role check, lookup, then ownership check
    pub(crate) async fn authorized_appointment(
        &self,
        actor: &Actor,
        role: &Role,
        operation: Operation,
        id: AppointmentId,
    ) -> ClinicResult<Appointment> {
        authorize_role(actor, role, operation)?;
        let appointment = self.reload(id).await?;
        authorize(actor, role, operation, Some(&appointment.ownership()))?;
        Ok(appointment)
    }

    async fn reload(&self, id: AppointmentId) -> ClinicResult<Appointment> {
        self.appointments
            .get(id)
            .await?
            .ok_or_else(|| ClinicError::not_found(EntityKind::Appointment, id))
    }

    pub(crate) async fn require_patient(&self, id: PatientId) -> ClinicResult<PatientProfile> {
        self.patients
            .patient(id)
            .await?
            .ok_or_else(|| ClinicError::not_found(EntityKind::Patient, id))
    }

    pub(crate) fn audit(
        &self,
        actor: &Actor,
        action: AuditAction,
        object_type: ObjectType,
        object_id: u64,
        appointment_id: Option<AppointmentId>,
        message: impl Into<String>,
    ) {
        record_audit(
            self.audit.as_ref(),
            AuditEntry::new(
                actor.id,
                action,
                object_type,
                object_id,
                appointment_id,
                message,
                self.clock.now(),
            ),
        );
    }
}
