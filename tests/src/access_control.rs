//! Access Control Tests
//!
//! Tests for role and ownership enforcement at the gate:
//! - Doctors act only on their own calendar
//! - Patients act only on their own appointments
//! - Denials never reveal the failed rule or the target's existence

#[cfg(test)]
mod doctor_ownership_tests {
    use crate::harness::{booking, slot, Clinic};
    use appointments::AppointmentRepository;
    use appointments_integrity::AppointmentInput;
    use clinic_shared::ClinicError;

    /// Another doctor is denied even when the payload is invalid
    #[tokio::test]
    async fn test_non_owner_denied_regardless_of_payload() {
        let clinic = Clinic::new();
        let d1 = clinic.doctor("d1").await;
        let d2 = clinic.doctor("d2").await;
        let patient = clinic.patient("p", None).await;
        let appt = clinic
            .service
            .create(&d1, booking(&patient, slot(10, 9, 0), slot(10, 10, 0)))
            .await
            .unwrap();

        let valid = booking(&patient, slot(10, 15, 0), slot(10, 16, 0));
        let invalid = AppointmentInput::default();
        for input in [valid, invalid] {
            let err = clinic.service.edit(&d2, appt.id, input).await.unwrap_err();
            assert_eq!(err, ClinicError::PermissionDenied);
        }
        for literal in ["DONE", "nonsense"] {
            let err = clinic
                .service
                .set_status(&d2, appt.id, literal)
                .await
                .unwrap_err();
            assert_eq!(err, ClinicError::PermissionDenied);
        }

        assert_eq!(clinic.store.get(appt.id).await.unwrap(), Some(appt));
        assert_eq!(clinic.audit.len(), 1);
    }

    #[tokio::test]
    async fn test_denial_message_is_generic() {
        let clinic = Clinic::new();
        let d1 = clinic.doctor("d1").await;
        let d2 = clinic.doctor("d2").await;
        let patient = clinic.patient("p", None).await;
        let appt = clinic
            .service
            .create(&d1, booking(&patient, slot(10, 9, 0), slot(10, 10, 0)))
            .await
            .unwrap();

        let err = clinic.service.set_status(&d2, appt.id, "DONE").await.unwrap_err();
        assert_eq!(err.to_string(), "not authorized");
        assert_eq!(err.kind().to_string(), "PERMISSION_DENIED");
    }

    #[tokio::test]
    async fn test_owner_gets_not_found_for_missing_appointment() {
        let clinic = Clinic::new();
        let doctor = clinic.doctor("d1").await;
        let err = clinic
            .service
            .set_status(&doctor, clinic_shared::AppointmentId(77), "DONE")
            .await
            .unwrap_err();
        assert!(matches!(err, ClinicError::NotFound { id: 77, .. }));
    }

    #[tokio::test]
    async fn test_doctor_cannot_confirm_or_cancel() {
        let clinic = Clinic::new();
        let doctor = clinic.doctor("d1").await;
        let patient = clinic.patient("p", None).await;
        let appt = clinic
            .service
            .create(&doctor, booking(&patient, slot(10, 9, 0), slot(10, 10, 0)))
            .await
            .unwrap();

        assert_eq!(
            clinic.service.confirm(&doctor, appt.id).await.unwrap_err(),
            ClinicError::PermissionDenied
        );
        assert_eq!(
            clinic.service.cancel(&doctor, appt.id).await.unwrap_err(),
            ClinicError::PermissionDenied
        );
    }
}

#[cfg(test)]
mod patient_scope_tests {
    use crate::harness::{booking, slot, Clinic};
    use clinic_shared::AppointmentId;
    use clinic_shared::ClinicError;

    #[tokio::test]
    async fn test_patient_cannot_create() {
        let clinic = Clinic::new();
        let patient = clinic.patient("p", None).await;
        let err = clinic
            .service
            .create(&patient, booking(&patient, slot(10, 9, 0), slot(10, 10, 0)))
            .await
            .unwrap_err();
        assert_eq!(err, ClinicError::PermissionDenied);
        assert_eq!(clinic.store.appointment_count().await, 0);
    }

    /// Doctor-only operations are denied before the lookup
    #[tokio::test]
    async fn test_patient_never_learns_whether_target_exists() {
        let clinic = Clinic::new();
        let patient = clinic.patient("p", None).await;
        let err = clinic
            .service
            .set_status(&patient, AppointmentId(999), "DONE")
            .await
            .unwrap_err();
        assert_eq!(err, ClinicError::PermissionDenied);
    }

    #[tokio::test]
    async fn test_patient_cannot_touch_someone_elses_appointment() {
        let clinic = Clinic::new();
        let doctor = clinic.doctor("d1").await;
        let owner = clinic.patient("owner", None).await;
        let intruder = clinic.patient("intruder", None).await;
        let appt = clinic
            .service
            .create(&doctor, booking(&owner, slot(10, 9, 0), slot(10, 10, 0)))
            .await
            .unwrap();

        assert_eq!(
            clinic.service.confirm(&intruder, appt.id).await.unwrap_err(),
            ClinicError::PermissionDenied
        );
        assert_eq!(
            clinic.service.cancel(&intruder, appt.id).await.unwrap_err(),
            ClinicError::PermissionDenied
        );
        assert_eq!(
            clinic
                .service
                .appointment_detail(&intruder, appt.id)
                .await
                .unwrap_err(),
            ClinicError::PermissionDenied
        );
    }
}
