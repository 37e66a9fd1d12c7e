//! Concurrency Tests
//!
//! Racing bookings against the same calendar from many tasks. The calendar
//! lock must let exactly one overlapping request through.

#[cfg(test)]
mod racing_tests {
    use crate::harness::{booking, slot, Clinic};
    use clinic_shared::{ClinicError, ErrorKind};

    const RACERS: usize = 8;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_overlapping_creates_admit_exactly_one() {
        let clinic = Clinic::new();
        let doctor = clinic.doctor("d1").await;
        let patient = clinic.patient("p", None).await;

        let mut handles = Vec::with_capacity(RACERS);
        for i in 0..RACERS {
            let service = clinic.service.clone();
            let doctor = doctor.clone();
            // Every request covers 10:30
            let input = booking(&patient, slot(10, 10, i as u32), slot(10, 11, i as u32));
            handles.push(tokio::spawn(async move { service.create(&doctor, input).await }));
        }

        let mut booked = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => booked += 1,
                Err(err) => assert_eq!(err, ClinicError::Conflict),
            }
        }
        assert_eq!(booked, 1);
        assert_eq!(clinic.store.appointment_count().await, 1);
        assert_eq!(clinic.audit.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_different_doctors_do_not_contend() {
        let clinic = Clinic::new();
        let patient = clinic.patient("p", None).await;
        let mut doctors = Vec::new();
        for i in 0..RACERS {
            doctors.push(clinic.doctor(&format!("dr{}", i)).await);
        }

        let handles: Vec<_> = doctors
            .into_iter()
            .map(|doctor| {
                let service = clinic.service.clone();
                let input = booking(&patient, slot(10, 10, 0), slot(10, 11, 0));
                tokio::spawn(async move { service.create(&doctor, input).await })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(clinic.store.appointment_count().await, RACERS);
    }

    /// An edit racing a create for the same free slot
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_edit_and_create_race_for_one_slot() {
        let clinic = Clinic::new();
        let doctor = clinic.doctor("d1").await;
        let patient = clinic.patient("p", None).await;
        let existing = clinic
            .service
            .create(&doctor, booking(&patient, slot(10, 8, 0), slot(10, 9, 0)))
            .await
            .unwrap();

        let edit = {
            let service = clinic.service.clone();
            let doctor = doctor.clone();
            let input = booking(&patient, slot(10, 14, 0), slot(10, 15, 0));
            tokio::spawn(async move { service.edit(&doctor, existing.id, input).await })
        };
        let create = {
            let service = clinic.service.clone();
            let doctor = doctor.clone();
            let input = booking(&patient, slot(10, 14, 30), slot(10, 15, 30));
            tokio::spawn(async move { service.create(&doctor, input).await })
        };

        let outcomes = [edit.await.unwrap().err(), create.await.unwrap().err()];
        let conflicts = outcomes
            .iter()
            .filter(|e| matches!(e, Some(err) if err.kind() == ErrorKind::Conflict))
            .count();
        assert_eq!(conflicts, 1);
        assert!(outcomes.iter().flatten().all(|e| e.kind() == ErrorKind::Conflict));
    }
}

/// Checks made before the calendar lock must hold again once it is taken
#[cfg(test)]
mod stale_check_tests {
    use crate::harness::{booking, patient_id, slot, Clinic};
    use appointments::{AppointmentRepository, PatientRepository};
    use appointments_integrity::{Appointment, AppointmentStatus};
    use clinic_shared::{ClinicError, EntityKind};

    async fn let_others_run() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_patient_action_rechecks_ownership_under_lock() {
        let clinic = Clinic::new();
        let doctor = clinic.doctor("d1").await;
        let former = clinic.patient("p1", None).await;
        let current = clinic.patient("p2", None).await;
        let appt = clinic
            .service
            .create(&doctor, booking(&former, slot(10, 9, 0), slot(10, 10, 0)))
            .await
            .unwrap();

        let calendar = clinic.store.lock_calendar(doctor.id).await;
        let confirm = {
            let service = clinic.service.clone();
            let former = former.clone();
            tokio::spawn(async move { service.confirm(&former, appt.id).await })
        };
        let_others_run().await;
        clinic
            .store
            .update(
                &calendar,
                Appointment {
                    patient_id: patient_id(&current),
                    ..appt.clone()
                },
            )
            .await
            .unwrap();
        drop(calendar);

        let err = confirm.await.unwrap().unwrap_err();
        assert_eq!(err, ClinicError::PermissionDenied);
        let stored = clinic.store.get(appt.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AppointmentStatus::Pending);
        assert_eq!(stored.patient_id, patient_id(&current));
        assert_eq!(clinic.audit.len(), 1);
    }

    #[tokio::test]
    async fn test_create_loses_to_concurrent_patient_removal() {
        let clinic = Clinic::new();
        let doctor = clinic.doctor("d1").await;
        let patient = clinic.patient("p1", None).await;

        let calendar = clinic.store.lock_calendar(doctor.id).await;
        let create = {
            let service = clinic.service.clone();
            let doctor = doctor.clone();
            let input = booking(&patient, slot(10, 9, 0), slot(10, 10, 0));
            tokio::spawn(async move { service.create(&doctor, input).await })
        };
        let_others_run().await;
        clinic.store.remove_patient(patient_id(&patient)).await.unwrap();
        drop(calendar);

        let err = create.await.unwrap().unwrap_err();
        assert!(matches!(err, ClinicError::NotFound { entity: EntityKind::Patient, .. }));
        assert_eq!(clinic.store.appointment_count().await, 0);
        assert!(clinic.audit.is_empty());
    }
}
