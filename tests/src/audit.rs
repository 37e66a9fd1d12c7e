//! Audit Trail Tests
//!
//! Exactly one entry per successful mutation or export, none on failure.

#[cfg(test)]
mod audit_tests {
    use crate::harness::{booking, slot, Clinic};
    use appointments_integrity::{NoteInput, RecordKind};
    use clinic_shared::{AuditAction, ObjectType};

    #[tokio::test]
    async fn test_one_entry_per_success() {
        let clinic = Clinic::new();
        let doctor = clinic.doctor("d1").await;
        let patient = clinic.patient("p", None).await;

        let appt = clinic
            .service
            .create(&doctor, booking(&patient, slot(10, 9, 0), slot(10, 10, 0)))
            .await
            .unwrap();
        clinic
            .service
            .edit(&doctor, appt.id, booking(&patient, slot(10, 9, 30), slot(10, 10, 30)))
            .await
            .unwrap();
        clinic.service.confirm(&patient, appt.id).await.unwrap();
        let note = clinic
            .service
            .add_clinical_note(
                &doctor,
                appt.id,
                NoteInput {
                    content: "Follow up in two weeks".to_string(),
                    visible_to_patient: true,
                },
            )
            .await
            .unwrap();
        clinic
            .service
            .delete_record(&doctor, appt.id, RecordKind::ClinicalNote, note.id)
            .await
            .unwrap();
        clinic.service.prescription_document(&patient, appt.id).await.unwrap();

        let trail: Vec<_> = clinic
            .audit
            .entries()
            .into_iter()
            .map(|e| (e.action, e.object_type, e.actor_id))
            .collect();
        assert_eq!(
            trail,
            vec![
                (AuditAction::Create, ObjectType::Appointment, doctor.id),
                (AuditAction::Update, ObjectType::Appointment, doctor.id),
                (AuditAction::Status, ObjectType::Appointment, patient.id),
                (AuditAction::Create, ObjectType::ClinicalNote, doctor.id),
                (AuditAction::Delete, ObjectType::ClinicalNote, doctor.id),
                (AuditAction::Pdf, ObjectType::Appointment, patient.id),
            ]
        );
        assert!(clinic
            .audit
            .entries()
            .iter()
            .all(|e| e.appointment_id == Some(appt.id)));
    }

    #[tokio::test]
    async fn test_failures_leave_no_trace() {
        let clinic = Clinic::new();
        let doctor = clinic.doctor("d1").await;
        let other = clinic.doctor("d2").await;
        let patient = clinic.patient("p", None).await;
        let appt = clinic
            .service
            .create(&doctor, booking(&patient, slot(10, 9, 0), slot(10, 10, 0)))
            .await
            .unwrap();
        assert_eq!(clinic.audit.len(), 1);

        // Conflict, validation, permission, transition and unknown literal
        assert!(clinic
            .service
            .create(&doctor, booking(&patient, slot(10, 9, 30), slot(10, 10, 30)))
            .await
            .is_err());
        assert!(clinic
            .service
            .create(&doctor, booking(&patient, slot(10, 12, 0), slot(10, 11, 0)))
            .await
            .is_err());
        assert!(clinic.service.set_status(&other, appt.id, "DONE").await.is_err());
        clinic.service.set_status(&doctor, appt.id, "DONE").await.unwrap();
        assert!(clinic.service.cancel(&patient, appt.id).await.is_err());
        assert!(clinic.service.set_status(&doctor, appt.id, "FINISHED").await.is_err());

        let actions: Vec<_> = clinic.audit.entries().iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![AuditAction::Create, AuditAction::Status]);
    }

    #[tokio::test]
    async fn test_entry_carries_clock_time() {
        let clinic = Clinic::new();
        let doctor = clinic.doctor("d1").await;
        let patient = clinic.patient("p", None).await;
        clinic.clock.set(slot(2, 8, 15));
        clinic
            .service
            .create(&doctor, booking(&patient, slot(10, 9, 0), slot(10, 10, 0)))
            .await
            .unwrap();
        let entry = &clinic.audit.entries()[0];
        assert_eq!(entry.timestamp, slot(2, 8, 15));
        assert_eq!(entry.message, "created appointment");
    }
}
