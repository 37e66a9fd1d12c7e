//! Status Transition Tests
//!
//! Tests for the role-scoped appointment state machine:
//! - Patient confirm/cancel guards
//! - Doctor latitude under the default and strict policies
//! - Literal validation

#[cfg(test)]
mod patient_tests {
    use crate::harness::{booking, slot, Clinic};
    use appointments::AppointmentRepository;
    use appointments_integrity::AppointmentStatus;
    use clinic_shared::ValidationErrorCode;

    #[tokio::test]
    async fn test_confirm_is_idempotent() {
        let clinic = Clinic::new();
        let doctor = clinic.doctor("dr").await;
        let patient = clinic.patient("p", None).await;
        let appt = clinic
            .service
            .create(&doctor, booking(&patient, slot(10, 9, 0), slot(10, 10, 0)))
            .await
            .unwrap();

        for _ in 0..2 {
            let confirmed = clinic.service.confirm(&patient, appt.id).await.unwrap();
            assert_eq!(confirmed.status, AppointmentStatus::Confirmed);
        }
    }

    #[tokio::test]
    async fn test_confirm_blocked_on_cancelled_and_done() {
        let clinic = Clinic::new();
        let doctor = clinic.doctor("dr").await;
        let patient = clinic.patient("p", None).await;

        for (hour, literal) in [(9, "CANCELLED"), (11, "DONE")] {
            let appt = clinic
                .service
                .create(&doctor, booking(&patient, slot(10, hour, 0), slot(10, hour + 1, 0)))
                .await
                .unwrap();
            clinic.service.set_status(&doctor, appt.id, literal).await.unwrap();

            let err = clinic.service.confirm(&patient, appt.id).await.unwrap_err();
            assert_eq!(err.validation_codes(), vec![ValidationErrorCode::InvalidTransition]);
            let stored = clinic.store.get(appt.id).await.unwrap().unwrap();
            assert_eq!(stored.status.as_str(), literal);
        }
    }

    #[tokio::test]
    async fn test_cancel_allowed_until_done() {
        let clinic = Clinic::new();
        let doctor = clinic.doctor("dr").await;
        let patient = clinic.patient("p", None).await;

        for (hour, literal) in [(9, "PENDING"), (11, "CONFIRMED")] {
            let appt = clinic
                .service
                .create(&doctor, booking(&patient, slot(10, hour, 0), slot(10, hour + 1, 0)))
                .await
                .unwrap();
            clinic.service.set_status(&doctor, appt.id, literal).await.unwrap();
            let cancelled = clinic.service.cancel(&patient, appt.id).await.unwrap();
            assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
        }

        let done = clinic
            .service
            .create(&doctor, booking(&patient, slot(10, 14, 0), slot(10, 15, 0)))
            .await
            .unwrap();
        clinic.service.set_status(&doctor, done.id, "DONE").await.unwrap();
        let err = clinic.service.cancel(&patient, done.id).await.unwrap_err();
        assert!(err.to_string().contains("cannot cancel a finished appointment"));
    }
}

#[cfg(test)]
mod doctor_tests {
    use crate::harness::{booking, slot, Clinic};
    use appointments_integrity::AppointmentStatus;
    use clinic_shared::config::ClinicConfig;
    use clinic_shared::ValidationErrorCode;

    #[tokio::test]
    async fn test_every_literal_is_settable() {
        let clinic = Clinic::new();
        let doctor = clinic.doctor("dr").await;
        let patient = clinic.patient("p", None).await;
        let appt = clinic
            .service
            .create(&doctor, booking(&patient, slot(10, 9, 0), slot(10, 10, 0)))
            .await
            .unwrap();

        for status in [
            AppointmentStatus::Done,
            AppointmentStatus::Pending,
            AppointmentStatus::Cancelled,
            AppointmentStatus::Confirmed,
        ] {
            let updated = clinic
                .service
                .set_status(&doctor, appt.id, status.as_str())
                .await
                .unwrap();
            assert_eq!(updated.status, status);
        }
    }

    #[tokio::test]
    async fn test_lowercase_literal_rejected() {
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
            .set_status(&doctor, appt.id, "done")
            .await
            .unwrap_err();
        assert_eq!(err.validation_codes(), vec![ValidationErrorCode::InvalidFormat]);
    }

    #[tokio::test]
    async fn test_strict_policy_from_config() {
        let clinic = Clinic::with_config(ClinicConfig {
            strict_doctor_transitions: true,
            ..ClinicConfig::default()
        });
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
            .set_status(&doctor, appt.id, "CONFIRMED")
            .await
            .unwrap_err();
        assert_eq!(err.validation_codes(), vec![ValidationErrorCode::InvalidTransition]);
        clinic
            .service
            .set_status(&doctor, appt.id, "CANCELLED")
            .await
            .unwrap();
    }
}
