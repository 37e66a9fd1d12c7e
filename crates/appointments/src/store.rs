use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use appointments_integrity::{
    validate_appointment, validate_patient_profile, Appointment, ChildRecord, RecordKind,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clinic_shared::{
    Actor, ActorId, AppointmentId, ClinicError, ClinicResult, Clock, EntityKind, PatientId,
    PatientProfile, RecordId, SystemClock, ValidationErrorCode, ValidationResult,
};
use log::{debug, info};
use tokio::sync::Mutex as TokioMutex;

use crate::repository::{
    AppointmentFilter, AppointmentRepository, CalendarGuard, NewActor, NewAppointment,
    PatientDetails, PatientRepository, RecordRepository,
};

/// Process-local store implementing every repository trait.
///
/// Ids are sequential per entity, starting at 1.
pub struct InMemoryClinicStore {
    clock: Arc<dyn Clock>,
    appointments: TokioMutex<BTreeMap<AppointmentId, Appointment>>,
    calendars: TokioMutex<HashMap<ActorId, Arc<TokioMutex<()>>>>,
    actors: TokioMutex<BTreeMap<ActorId, Actor>>,
    records: TokioMutex<Vec<ChildRecord>>,
    next_appointment: AtomicU64,
    next_actor: AtomicU64,
    next_patient: AtomicU64,
    next_record: AtomicU64,
}

impl Default for InMemoryClinicStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryClinicStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Store stamping profile creation times from `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        InMemoryClinicStore {
            clock,
            appointments: TokioMutex::new(BTreeMap::new()),
            calendars: TokioMutex::new(HashMap::new()),
            actors: TokioMutex::new(BTreeMap::new()),
            records: TokioMutex::new(Vec::new()),
            next_appointment: AtomicU64::new(1),
            next_actor: AtomicU64::new(1),
            next_patient: AtomicU64::new(1),
            next_record: AtomicU64::new(1),
        }
    }

    pub async fn appointment_count(&self) -> usize {
        self.appointments.lock().await.len()
    }

    fn check_patient(actors: &BTreeMap<ActorId, Actor>, id: PatientId) -> ClinicResult<()> {
        let exists = actors
            .values()
            .any(|a| a.patient_profile.as_ref().map(|p| p.id) == Some(id));
        if exists {
            Ok(())
        } else {
            Err(ClinicError::not_found(EntityKind::Patient, id))
        }
    }

    fn check_guard(guard: &CalendarGuard, doctor_id: ActorId) -> ClinicResult<()> {
        if guard.doctor_id() != doctor_id {
            return Err(ClinicError::Storage(format!(
                "calendar lock held for doctor {}, write targets doctor {}",
                guard.doctor_id(),
                doctor_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl AppointmentRepository for InMemoryClinicStore {
    async fn lock_calendar(&self, doctor_id: ActorId) -> CalendarGuard {
        let calendar = {
            let mut calendars = self.calendars.lock().await;
            calendars.entry(doctor_id).or_default().clone()
        };
        CalendarGuard::new(doctor_id, calendar.lock_owned().await)
    }

    async fn get(&self, id: AppointmentId) -> ClinicResult<Option<Appointment>> {
        Ok(self.appointments.lock().await.get(&id).cloned())
    }

    async fn find_overlapping(
        &self,
        doctor_id: ActorId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<AppointmentId>,
    ) -> ClinicResult<Vec<Appointment>> {
        let appointments = self.appointments.lock().await;
        Ok(appointments
            .values()
            .filter(|a| a.doctor_id == doctor_id)
            .filter(|a| Some(a.id) != exclude)
            .filter(|a| a.overlaps(start, end))
            .cloned()
            .collect())
    }

    async fn list(&self, filter: &AppointmentFilter) -> ClinicResult<Vec<Appointment>> {
        let appointments = self.appointments.lock().await;
        let mut matching: Vec<Appointment> = appointments
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.start_time.cmp(&a.start_time).then(b.id.cmp(&a.id)));
        Ok(matching)
    }

    async fn insert(&self, guard: &CalendarGuard, new: NewAppointment) -> ClinicResult<Appointment> {
        Self::check_guard(guard, new.doctor_id)?;
        // Same order as remove_patient: appointments, then actors
        let mut appointments = self.appointments.lock().await;
        Self::check_patient(&*self.actors.lock().await, new.patient_id)?;

        let mut appointment = Appointment {
            id: AppointmentId(0),
            patient_id: new.patient_id,
            doctor_id: new.doctor_id,
            start_time: new.start_time,
            end_time: new.end_time,
            reason: new.reason,
            status: new.status,
            created_at: new.created_at,
        };
        validate_appointment(&appointment)?;
        appointment.id = AppointmentId(self.next_appointment.fetch_add(1, Ordering::SeqCst));
        appointments.insert(appointment.id, appointment.clone());
        debug!("stored appointment {} for doctor {}", appointment.id, appointment.doctor_id);
        Ok(appointment)
    }

    async fn update(&self, guard: &CalendarGuard, appointment: Appointment) -> ClinicResult<Appointment> {
        Self::check_guard(guard, appointment.doctor_id)?;
        validate_appointment(&appointment)?;

        let mut appointments = self.appointments.lock().await;
        Self::check_patient(&*self.actors.lock().await, appointment.patient_id)?;
        let stored = appointments
            .get_mut(&appointment.id)
            .ok_or_else(|| ClinicError::not_found(EntityKind::Appointment, appointment.id))?;
        // Moving an appointment to another calendar needs that calendar's lock too
        Self::check_guard(guard, stored.doctor_id)?;
        *stored = appointment.clone();
        Ok(appointment)
    }
}

#[async_trait]
impl PatientRepository for InMemoryClinicStore {
    async fn register_actor(&self, new: NewActor) -> ClinicResult<Actor> {
        let mut result = ValidationResult::new();
        result.check_not_blank("username", &new.username);

        let mut actors = self.actors.lock().await;
        if actors.values().any(|a| a.username == new.username) {
            result.add_error("username", "is already taken", ValidationErrorCode::InvalidFormat);
        }
        result.into_result()?;

        let mut actor = Actor::new(ActorId(self.next_actor.fetch_add(1, Ordering::SeqCst)), new.username)
            .with_full_name(new.full_name);
        actor.email = new.email.filter(|email| !email.trim().is_empty());
        actors.insert(actor.id, actor.clone());
        info!("registered actor {} ({})", actor.id, actor.username);
        Ok(actor)
    }

    async fn attach_patient_profile(
        &self,
        actor_id: ActorId,
        details: PatientDetails,
    ) -> ClinicResult<Actor> {
        let mut actors = self.actors.lock().await;
        let actor = actors
            .get_mut(&actor_id)
            .ok_or_else(|| ClinicError::not_found(EntityKind::Actor, actor_id))?;
        if actor.patient_profile.is_some() {
            return Err(ClinicError::invalid(
                "actor",
                "already has a patient profile",
                ValidationErrorCode::InvalidReference,
            ));
        }

        let profile = PatientProfile {
            id: PatientId(self.next_patient.load(Ordering::SeqCst)),
            actor_id,
            phone: details.phone,
            birth_date: details.birth_date,
            address: details.address,
            created_at: self.clock.now(),
        };
        validate_patient_profile(&profile)?;
        self.next_patient.fetch_add(1, Ordering::SeqCst);

        info!("actor {} is now patient {}", actor_id, profile.id);
        actor.patient_profile = Some(profile);
        Ok(actor.clone())
    }

    async fn actor(&self, id: ActorId) -> ClinicResult<Option<Actor>> {
        Ok(self.actors.lock().await.get(&id).cloned())
    }

    async fn patient(&self, id: PatientId) -> ClinicResult<Option<PatientProfile>> {
        let actors = self.actors.lock().await;
        Ok(actors
            .values()
            .filter_map(|a| a.patient_profile.as_ref())
            .find(|p| p.id == id)
            .cloned())
    }

    async fn actor_for_patient(&self, id: PatientId) -> ClinicResult<Option<Actor>> {
        let actors = self.actors.lock().await;
        Ok(actors
            .values()
            .find(|a| a.patient_profile.as_ref().map(|p| p.id) == Some(id))
            .cloned())
    }

    async fn remove_patient(&self, id: PatientId) -> ClinicResult<()> {
        // Appointments before actors, the only place both are held
        let appointments = self.appointments.lock().await;
        let mut actors = self.actors.lock().await;

        let owner = actors
            .values_mut()
            .find(|a| a.patient_profile.as_ref().map(|p| p.id) == Some(id))
            .ok_or_else(|| ClinicError::not_found(EntityKind::Patient, id))?;

        let referenced = appointments.values().filter(|a| a.patient_id == id).count();
        if referenced > 0 {
            return Err(ClinicError::invalid(
                "patient",
                &format!("is referenced by {} appointment(s)", referenced),
                ValidationErrorCode::InvalidReference,
            ));
        }

        owner.patient_profile = None;
        info!("removed patient {} from actor {}", id, owner.id);
        Ok(())
    }
}

#[async_trait]
impl RecordRepository for InMemoryClinicStore {
    async fn insert_record(&self, record: ChildRecord) -> ClinicResult<ChildRecord> {
        let record = record.with_id(RecordId(self.next_record.fetch_add(1, Ordering::SeqCst)));
        self.records.lock().await.push(record.clone());
        Ok(record)
    }

    async fn records_for(&self, appointment_id: AppointmentId) -> ClinicResult<Vec<ChildRecord>> {
        let records = self.records.lock().await;
        let mut found: Vec<ChildRecord> = records
            .iter()
            .filter(|r| r.appointment_id() == appointment_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then(b.id().cmp(&a.id())));
        Ok(found)
    }

    async fn delete_record(
        &self,
        appointment_id: AppointmentId,
        kind: RecordKind,
        id: RecordId,
    ) -> ClinicResult<bool> {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|r| !(r.id() == id && r.kind() == kind && r.appointment_id() == appointment_id));
        Ok(records.len() < before)
    }
}
