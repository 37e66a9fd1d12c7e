//! Persistence seams for the appointment coordinator.
//!
//! The service talks to storage only through these traits. Every write that
//! touches a doctor's calendar takes a [`CalendarGuard`], so a backend can
//! verify the caller serialized its read-check-write sequence.

use appointments_integrity::{Appointment, AppointmentStatus, ChildRecord, RecordKind};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use clinic_shared::{
    Actor, ActorId, AppointmentId, ClinicResult, PatientId, PatientProfile, RecordId,
};
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;

/// Exclusive hold on one doctor's calendar. Released on drop.
#[derive(Debug)]
pub struct CalendarGuard {
    doctor_id: ActorId,
    _held: OwnedMutexGuard<()>,
}

impl CalendarGuard {
    pub fn new(doctor_id: ActorId, held: OwnedMutexGuard<()>) -> Self {
        Self {
            doctor_id,
            _held: held,
        }
    }

    pub fn doctor_id(&self) -> ActorId {
        self.doctor_id
    }
}

/// Appointment fields supplied by the caller; the store assigns the id
#[derive(Clone, Debug, PartialEq)]
pub struct NewAppointment {
    pub patient_id: PatientId,
    pub doctor_id: ActorId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub reason: String,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
}

/// Selection criteria for [`AppointmentRepository::list`]. Empty matches all.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AppointmentFilter {
    pub doctor_id: Option<ActorId>,
    pub patient_id: Option<PatientId>,
    /// Inclusive lower bound on `start_time`
    pub starts_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `start_time`
    pub starts_before: Option<DateTime<Utc>>,
    /// Empty means any status
    pub statuses: Vec<AppointmentStatus>,
}

impl AppointmentFilter {
    pub fn for_doctor(doctor_id: ActorId) -> Self {
        Self {
            doctor_id: Some(doctor_id),
            ..Self::default()
        }
    }

    pub fn for_patient(patient_id: PatientId) -> Self {
        Self {
            patient_id: Some(patient_id),
            ..Self::default()
        }
    }

    pub fn starting_between(mut self, from: DateTime<Utc>, before: DateTime<Utc>) -> Self {
        self.starts_from = Some(from);
        self.starts_before = Some(before);
        self
    }

    pub fn starting_before(mut self, before: DateTime<Utc>) -> Self {
        self.starts_before = Some(before);
        self
    }

    pub fn with_statuses(mut self, statuses: &[AppointmentStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.doctor_id.map_or(true, |id| appointment.doctor_id == id)
            && self.patient_id.map_or(true, |id| appointment.patient_id == id)
            && self.starts_from.map_or(true, |from| appointment.start_time >= from)
            && self
                .starts_before
                .map_or(true, |before| appointment.start_time < before)
            && (self.statuses.is_empty() || self.statuses.contains(&appointment.status))
    }
}

#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    /// Wait for exclusive access to `doctor_id`'s calendar
    async fn lock_calendar(&self, doctor_id: ActorId) -> CalendarGuard;

    async fn get(&self, id: AppointmentId) -> ClinicResult<Option<Appointment>>;

    /// Appointments of `doctor_id` overlapping `[start, end)`, any status
    async fn find_overlapping(
        &self,
        doctor_id: ActorId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<AppointmentId>,
    ) -> ClinicResult<Vec<Appointment>>;

    /// Matching appointments, most recent start first
    async fn list(&self, filter: &AppointmentFilter) -> ClinicResult<Vec<Appointment>>;

    async fn insert(&self, guard: &CalendarGuard, new: NewAppointment) -> ClinicResult<Appointment>;

    /// Replace a stored appointment; the guard must cover its doctor
    async fn update(&self, guard: &CalendarGuard, appointment: Appointment) -> ClinicResult<Appointment>;
}

/// Contact details used when attaching a patient profile
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PatientDetails {
    pub phone: String,
    pub birth_date: Option<NaiveDate>,
    pub address: String,
}

/// Identity data for a new actor
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NewActor {
    pub username: String,
    pub full_name: String,
    pub email: Option<String>,
}

/// Actor and patient directory
#[async_trait]
pub trait PatientRepository: Send + Sync {
    async fn register_actor(&self, new: NewActor) -> ClinicResult<Actor>;

    /// Give an actor a patient profile, making it a patient
    async fn attach_patient_profile(
        &self,
        actor_id: ActorId,
        details: PatientDetails,
    ) -> ClinicResult<Actor>;

    async fn actor(&self, id: ActorId) -> ClinicResult<Option<Actor>>;

    async fn patient(&self, id: PatientId) -> ClinicResult<Option<PatientProfile>>;

    /// Actor owning a patient profile
    async fn actor_for_patient(&self, id: PatientId) -> ClinicResult<Option<Actor>>;

    /// Delete a profile; fails while any appointment references it
    async fn remove_patient(&self, id: PatientId) -> ClinicResult<()>;
}

/// Notes, prescriptions and files hanging off appointments
#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// Store a record, assigning its id
    async fn insert_record(&self, record: ChildRecord) -> ClinicResult<ChildRecord>;

    /// Records of one appointment, newest first
    async fn records_for(&self, appointment_id: AppointmentId) -> ClinicResult<Vec<ChildRecord>>;

    /// Remove a record of `kind` under `appointment_id`; false when absent
    async fn delete_record(
        &self,
        appointment_id: AppointmentId,
        kind: RecordKind,
        id: RecordId,
    ) -> ClinicResult<bool>;
}
