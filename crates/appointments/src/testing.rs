//! Shared fixture for the unit tests of this crate

use std::sync::Arc;

use appointments_integrity::{Appointment, AppointmentInput};
use chrono::{DateTime, TimeZone, Utc};
use clinic_shared::{Actor, FixedClock, MemoryAuditSink, PatientId};

use crate::documents::MemoryNotificationSink;
use crate::gate::AppointmentService;
use crate::repository::{NewActor, PatientDetails, PatientRepository};
use crate::store::InMemoryClinicStore;

/// 2025-03-10 at `hour:minute` UTC
pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    on(10, hour, minute)
}

/// 2025-03-`day` at `hour:minute` UTC
pub fn on(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, day, hour, minute, 0).unwrap()
}

pub fn booking(patient_id: PatientId, start: DateTime<Utc>, end: DateTime<Utc>) -> AppointmentInput {
    AppointmentInput {
        patient_id: Some(patient_id),
        start_time: Some(start),
        end_time: Some(end),
        reason: "Checkup".to_string(),
        status: None,
    }
}

/// Bare store holding patients 1..=`count`
pub async fn store_with_patients(count: u64) -> InMemoryClinicStore {
    let store = InMemoryClinicStore::new();
    for n in 1..=count {
        let actor = store
            .register_actor(NewActor {
                username: format!("patient{}", n),
                ..NewActor::default()
            })
            .await
            .unwrap();
        store
            .attach_patient_profile(actor.id, PatientDetails::default())
            .await
            .unwrap();
    }
    store
}

pub struct Fixture {
    pub store: Arc<InMemoryClinicStore>,
    pub service: AppointmentService,
    pub audit: Arc<MemoryAuditSink>,
    pub notifier: Arc<MemoryNotificationSink>,
    pub doctor: Actor,
    pub other_doctor: Actor,
    /// Has an e-mail address
    pub patient: Actor,
    /// Has no e-mail address
    pub other_patient: Actor,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::build(MemoryNotificationSink::new()).await
    }

    pub async fn with_refused_recipients(recipients: &[&str]) -> Self {
        Self::build(MemoryNotificationSink::refusing(recipients.iter().copied())).await
    }

    async fn build(notifier: MemoryNotificationSink) -> Self {
        let clock = Arc::new(FixedClock::new(on(1, 12, 0)));
        let store = Arc::new(InMemoryClinicStore::with_clock(clock.clone()));
        let audit = Arc::new(MemoryAuditSink::new());
        let notifier = Arc::new(notifier);
        let service = AppointmentService::new(store.clone())
            .with_audit_sink(audit.clone())
            .with_notifier(notifier.clone())
            .with_clock(clock);

        let doctor = register(&store, "dr.rojas", "Elena Rojas", None).await;
        let other_doctor = register(&store, "dr.vargas", "", None).await;
        let patient = register(&store, "ana", "Ana Mora", Some("ana@example.com")).await;
        let patient = store
            .attach_patient_profile(patient.id, PatientDetails::default())
            .await
            .unwrap();
        let other_patient = register(&store, "luis", "", None).await;
        let other_patient = store
            .attach_patient_profile(other_patient.id, PatientDetails::default())
            .await
            .unwrap();

        Self {
            store,
            service,
            audit,
            notifier,
            doctor,
            other_doctor,
            patient,
            other_patient,
        }
    }

    pub fn patient_id(&self) -> PatientId {
        self.patient.patient_profile.as_ref().unwrap().id
    }

    pub fn other_patient_id(&self) -> PatientId {
        self.other_patient.patient_profile.as_ref().unwrap().id
    }

    /// Book for `patient` on `doctor`'s calendar
    pub async fn book(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Appointment {
        self.book_for(self.patient_id(), start, end).await
    }

    pub async fn book_for(&self, patient_id: PatientId, start: DateTime<Utc>, end: DateTime<Utc>) -> Appointment {
        self.service
            .create(&self.doctor, booking(patient_id, start, end))
            .await
            .unwrap()
    }

    pub async fn book_with_other_doctor(
        &self,
        patient_id: PatientId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Appointment {
        self.service
            .create(&self.other_doctor, booking(patient_id, start, end))
            .await
            .unwrap()
    }
}

async fn register(store: &InMemoryClinicStore, username: &str, full_name: &str, email: Option<&str>) -> Actor {
    store
        .register_actor(NewActor {
            username: username.to_string(),
            full_name: full_name.to_string(),
            email: email.map(str::to_string),
        })
        .await
        .unwrap()
}
