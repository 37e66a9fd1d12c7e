use appointments_integrity::{
    validate_file_input, validate_note_input, validate_prescription_input, AppointmentFile,
    ChildRecord, ClinicalNote, FileInput, MedicalFile, NoteInput, Prescription,
    PrescriptionInput, RecordKind,
};
use clinic_shared::{
    role_of, Actor, AppointmentId, AuditAction, ClinicError, ClinicResult, Operation, RecordId,
};
use log::info;

use crate::gate::AppointmentService;

// ============================================================================
// Child Record Operations (owning doctor only)
// ============================================================================

impl AppointmentService {
    pub async fn add_clinical_note(
        &self,
        actor: &Actor,
        appointment_id: AppointmentId,
        input: NoteInput,
    ) -> ClinicResult<ClinicalNote> {
        self.check_records_access(actor, appointment_id).await?;
        validate_note_input(&input)?;
        let record = ChildRecord::ClinicalNote(ClinicalNote {
            id: RecordId(0),
            appointment_id,
            author_id: actor.id,
            content: input.content,
            visible_to_patient: input.visible_to_patient,
            created_at: self.clock.now(),
        });
        match self.store_record(actor, record, "added a clinical note").await? {
            ChildRecord::ClinicalNote(note) => Ok(note),
            other => Err(unexpected(other)),
        }
    }

    pub async fn add_prescription(
        &self,
        actor: &Actor,
        appointment_id: AppointmentId,
        input: PrescriptionInput,
    ) -> ClinicResult<Prescription> {
        self.check_records_access(actor, appointment_id).await?;
        validate_prescription_input(&input)?;
        let record = ChildRecord::Prescription(Prescription {
            id: RecordId(0),
            appointment_id,
            medication: input.medication.filter(|m| !m.trim().is_empty()),
            dosage: input.dosage,
            frequency: input.frequency,
            duration: input.duration,
            notes: input.notes,
            created_at: self.clock.now(),
        });
        match self.store_record(actor, record, "added a prescription").await? {
            ChildRecord::Prescription(rx) => Ok(rx),
            other => Err(unexpected(other)),
        }
    }

    /// Attachment uploaded with prescriptions, e.g. an X-ray
    pub async fn add_appointment_file(
        &self,
        actor: &Actor,
        appointment_id: AppointmentId,
        input: FileInput,
    ) -> ClinicResult<AppointmentFile> {
        self.check_records_access(actor, appointment_id).await?;
        let file = validate_file_input(&input)?;
        let record = ChildRecord::AppointmentFile(AppointmentFile {
            id: RecordId(0),
            appointment_id,
            title: input.title,
            file,
            created_at: self.clock.now(),
        });
        match self.store_record(actor, record, "uploaded a file").await? {
            ChildRecord::AppointmentFile(f) => Ok(f),
            other => Err(unexpected(other)),
        }
    }

    /// Lab or imaging document
    pub async fn add_medical_file(
        &self,
        actor: &Actor,
        appointment_id: AppointmentId,
        input: FileInput,
    ) -> ClinicResult<MedicalFile> {
        self.check_records_access(actor, appointment_id).await?;
        let file = validate_file_input(&input)?;
        let record = ChildRecord::MedicalFile(MedicalFile {
            id: RecordId(0),
            appointment_id,
            uploaded_by: actor.id,
            title: input.title,
            file,
            created_at: self.clock.now(),
        });
        match self.store_record(actor, record, "uploaded a medical file").await? {
            ChildRecord::MedicalFile(f) => Ok(f),
            other => Err(unexpected(other)),
        }
    }

    pub async fn delete_clinical_note(
        &self,
        actor: &Actor,
        appointment_id: AppointmentId,
        id: RecordId,
    ) -> ClinicResult<()> {
        self.delete_record(actor, appointment_id, RecordKind::ClinicalNote, id)
            .await
    }

    pub async fn delete_prescription(
        &self,
        actor: &Actor,
        appointment_id: AppointmentId,
        id: RecordId,
    ) -> ClinicResult<()> {
        self.delete_record(actor, appointment_id, RecordKind::Prescription, id)
            .await
    }

    pub async fn delete_appointment_file(
        &self,
        actor: &Actor,
        appointment_id: AppointmentId,
        id: RecordId,
    ) -> ClinicResult<()> {
        self.delete_record(actor, appointment_id, RecordKind::AppointmentFile, id)
            .await
    }

    pub async fn delete_medical_file(
        &self,
        actor: &Actor,
        appointment_id: AppointmentId,
        id: RecordId,
    ) -> ClinicResult<()> {
        self.delete_record(actor, appointment_id, RecordKind::MedicalFile, id)
            .await
    }

    /// Remove a record that must hang off `appointment_id`
    pub async fn delete_record(
        &self,
        actor: &Actor,
        appointment_id: AppointmentId,
        kind: RecordKind,
        id: RecordId,
    ) -> ClinicResult<()> {
        self.check_records_access(actor, appointment_id).await?;
        if !self.records.delete_record(appointment_id, kind, id).await? {
            return Err(ClinicError::not_found(kind.entity_kind(), id));
        }

        info!("actor {} deleted {:?} {} of appointment {}", actor.id, kind, id, appointment_id);
        self.audit(
            actor,
            AuditAction::Delete,
            kind.object_type(),
            id.0,
            Some(appointment_id),
            format!("deleted {}", kind.entity_kind()),
        );
        Ok(())
    }

    async fn check_records_access(&self, actor: &Actor, appointment_id: AppointmentId) -> ClinicResult<()> {
        let role = role_of(actor);
        self.authorized_appointment(actor, &role, Operation::ManageRecords, appointment_id)
            .await
            .map(|_| ())
    }

    async fn store_record(
        &self,
        actor: &Actor,
        record: ChildRecord,
        message: &str,
    ) -> ClinicResult<ChildRecord> {
        let stored = self.records.insert_record(record).await?;
        info!(
            "actor {} stored {:?} {} on appointment {}",
            actor.id,
            stored.kind(),
            stored.id(),
            stored.appointment_id()
        );
        self.audit(
            actor,
            AuditAction::Create,
            stored.kind().object_type(),
            stored.id().0,
            Some(stored.appointment_id()),
            message,
        );
        Ok(stored)
    }
}

fn unexpected(record: ChildRecord) -> ClinicError {
    ClinicError::Storage(format!(
        "store returned a {:?} for a different record kind",
        record.kind()
    ))
}
