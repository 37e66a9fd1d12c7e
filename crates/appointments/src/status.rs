//! Role-scoped appointment status transitions

use appointments_integrity::AppointmentStatus;
use clinic_shared::{config::ClinicConfig, ClinicError, ClinicResult, ValidationErrorCode};
use serde::{Deserialize, Serialize};

/// The only status changes open to patients
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum PatientAction {
    Confirm,
    Cancel,
}

impl PatientAction {
    pub fn target(&self) -> AppointmentStatus {
        match self {
            PatientAction::Confirm => AppointmentStatus::Confirmed,
            PatientAction::Cancel => AppointmentStatus::Cancelled,
        }
    }
}

/// Decides which status an appointment moves to
pub trait StatusPolicy: Send + Sync {
    /// Owning doctor requests `requested` while the appointment is `current`
    fn doctor_transition(
        &self,
        current: AppointmentStatus,
        requested: AppointmentStatus,
    ) -> ClinicResult<AppointmentStatus>;

    /// Owning patient applies `action` while the appointment is `current`
    fn patient_transition(
        &self,
        current: AppointmentStatus,
        action: PatientAction,
    ) -> ClinicResult<AppointmentStatus> {
        patient_rules(current, action)
    }
}

/// Patients confirm anything not cancelled or done, and cancel anything not done
pub fn patient_rules(
    current: AppointmentStatus,
    action: PatientAction,
) -> ClinicResult<AppointmentStatus> {
    use AppointmentStatus::*;
    match (action, current) {
        (PatientAction::Confirm, Cancelled | Done) => Err(ClinicError::invalid(
            "status",
            "cannot confirm a cancelled or finished appointment",
            ValidationErrorCode::InvalidTransition,
        )),
        (PatientAction::Cancel, Done) => Err(ClinicError::invalid(
            "status",
            "cannot cancel a finished appointment",
            ValidationErrorCode::InvalidTransition,
        )),
        (action, _) => Ok(action.target()),
    }
}

/// Doctors may set any status, including reopening finished appointments
#[derive(Clone, Copy, Debug, Default)]
pub struct PermissiveDoctorPolicy;

impl StatusPolicy for PermissiveDoctorPolicy {
    fn doctor_transition(
        &self,
        _current: AppointmentStatus,
        requested: AppointmentStatus,
    ) -> ClinicResult<AppointmentStatus> {
        Ok(requested)
    }
}

/// Doctors may not leave CANCELLED or DONE
#[derive(Clone, Copy, Debug, Default)]
pub struct TerminalGuardPolicy;

impl TerminalGuardPolicy {
    pub fn is_terminal(status: AppointmentStatus) -> bool {
        matches!(status, AppointmentStatus::Cancelled | AppointmentStatus::Done)
    }
}

impl StatusPolicy for TerminalGuardPolicy {
    fn doctor_transition(
        &self,
        current: AppointmentStatus,
        requested: AppointmentStatus,
    ) -> ClinicResult<AppointmentStatus> {
        if Self::is_terminal(current) && requested != current {
            return Err(ClinicError::invalid(
                "status",
                &format!("cannot move a {} appointment to {}", current, requested),
                ValidationErrorCode::InvalidTransition,
            ));
        }
        Ok(requested)
    }
}

pub struct StatusTransitionEngine {
    policy: Box<dyn StatusPolicy>,
}

impl Default for StatusTransitionEngine {
    fn default() -> Self {
        Self::new(Box::new(PermissiveDoctorPolicy))
    }
}

impl StatusTransitionEngine {
    pub fn new(policy: Box<dyn StatusPolicy>) -> Self {
        Self { policy }
    }

    /// Policy chosen by `strict_doctor_transitions`
    pub fn from_config(config: &ClinicConfig) -> Self {
        if config.strict_doctor_transitions {
            Self::new(Box::new(TerminalGuardPolicy))
        } else {
            Self::default()
        }
    }

    /// Parse a doctor-supplied literal; unknown values are rejected, never ignored
    pub fn parse_literal(literal: &str) -> ClinicResult<AppointmentStatus> {
        literal.parse()
    }

    pub fn doctor_transition(
        &self,
        current: AppointmentStatus,
        requested: AppointmentStatus,
    ) -> ClinicResult<AppointmentStatus> {
        self.policy.doctor_transition(current, requested)
    }

    pub fn patient_transition(
        &self,
        current: AppointmentStatus,
        action: PatientAction,
    ) -> ClinicResult<AppointmentStatus> {
        self.policy.patient_transition(current, action)
    }
}
