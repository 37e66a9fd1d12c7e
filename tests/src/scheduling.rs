//! Scheduling Tests
//!
//! Tests for appointment booking on a doctor's calendar:
//! - Half-open overlap (touching slots are fine)
//! - Per-doctor calendars
//! - Cancelled appointments keep their slot
//! - Edits exclude the appointment being edited
//! - Time range validation

#[cfg(test)]
mod booking_tests {
    use crate::harness::{booking, slot, Clinic};
    use appointments::AppointmentRepository;
    use clinic_shared::{ClinicError, ErrorKind, ValidationErrorCode};

    /// D1 has 10:00-11:00; overlapping, touching and other-doctor requests
    #[tokio::test]
    async fn test_two_doctor_scenario() {
        let clinic = Clinic::new();
        let d1 = clinic.doctor("d1").await;
        let d2 = clinic.doctor("d2").await;
        let p = clinic.patient("p", None).await;

        clinic
            .service
            .create(&d1, booking(&p, slot(10, 10, 0), slot(10, 11, 0)))
            .await
            .unwrap();

        let err = clinic
            .service
            .create(&d1, booking(&p, slot(10, 10, 30), slot(10, 11, 30)))
            .await
            .unwrap_err();
        assert_eq!(err, ClinicError::Conflict);
        assert_eq!(err.kind().to_string(), "CONFLICT");

        clinic
            .service
            .create(&d1, booking(&p, slot(10, 11, 0), slot(10, 12, 0)))
            .await
            .unwrap();
        clinic
            .service
            .create(&d2, booking(&p, slot(10, 10, 30), slot(10, 11, 30)))
            .await
            .unwrap();
        assert_eq!(clinic.store.appointment_count().await, 3);
    }

    #[tokio::test]
    async fn test_cancelled_slot_stays_taken() {
        let clinic = Clinic::new();
        let doctor = clinic.doctor("dr").await;
        let patient = clinic.patient("p", None).await;
        let appt = clinic
            .service
            .create(&doctor, booking(&patient, slot(10, 9, 0), slot(10, 10, 0)))
            .await
            .unwrap();
        clinic.service.cancel(&patient, appt.id).await.unwrap();

        let err = clinic
            .service
            .create(&doctor, booking(&patient, slot(10, 9, 0), slot(10, 10, 0)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_inverted_or_empty_range_persists_nothing() {
        let clinic = Clinic::new();
        let doctor = clinic.doctor("dr").await;
        let patient = clinic.patient("p", None).await;

        for (start, end) in [(slot(10, 11, 0), slot(10, 10, 0)), (slot(10, 10, 0), slot(10, 10, 0))] {
            let err = clinic
                .service
                .create(&doctor, booking(&patient, start, end))
                .await
                .unwrap_err();
            assert_eq!(err.validation_codes(), vec![ValidationErrorCode::OutOfRange]);
        }
        assert_eq!(clinic.store.appointment_count().await, 0);
        assert!(clinic.audit.is_empty());
    }

    #[tokio::test]
    async fn test_edit_into_neighbour_conflicts_but_own_range_does_not() {
        let clinic = Clinic::new();
        let doctor = clinic.doctor("dr").await;
        let patient = clinic.patient("p", None).await;
        let first = clinic
            .service
            .create(&doctor, booking(&patient, slot(10, 9, 0), slot(10, 10, 0)))
            .await
            .unwrap();
        clinic
            .service
            .create(&doctor, booking(&patient, slot(10, 10, 0), slot(10, 11, 0)))
            .await
            .unwrap();

        clinic
            .service
            .edit(&doctor, first.id, booking(&patient, slot(10, 9, 0), slot(10, 10, 0)))
            .await
            .unwrap();
        let err = clinic
            .service
            .edit(&doctor, first.id, booking(&patient, slot(10, 9, 30), slot(10, 10, 30)))
            .await
            .unwrap_err();
        assert_eq!(err, ClinicError::Conflict);

        let stored = clinic.store.get(first.id).await.unwrap().unwrap();
        assert_eq!(stored.end_time, slot(10, 10, 0));
    }

    #[tokio::test]
    async fn test_edit_with_bad_range_leaves_row_unchanged() {
        let clinic = Clinic::new();
        let doctor = clinic.doctor("dr").await;
        let patient = clinic.patient("p", None).await;
        let appt = clinic
            .service
            .create(&doctor, booking(&patient, slot(10, 9, 0), slot(10, 10, 0)))
            .await
            .unwrap();

        let err = clinic
            .service
            .edit(&doctor, appt.id, booking(&patient, slot(10, 12, 0), slot(10, 11, 0)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert_eq!(clinic.store.get(appt.id).await.unwrap(), Some(appt));
    }
}
