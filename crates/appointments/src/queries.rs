//! Read-side views: appointment lists, agenda, dashboard, history, detail

use appointments_integrity::{
    Appointment, AppointmentFile, AppointmentStatus, ChildRecord, ClinicalNote, MedicalFile,
    Prescription,
};
use chrono::{DateTime, NaiveDate, Utc};
use clinic_shared::{
    authorize, role_of, Actor, AppointmentId, ClinicError, ClinicResult, Operation,
    PaginatedResult, PaginationInput, Role,
};
use serde::{Deserialize, Serialize};

use crate::gate::AppointmentService;
use crate::repository::AppointmentFilter;

/// Per-status tally
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusCounts {
    pub total: usize,
    pub pending: usize,
    pub confirmed: usize,
    pub cancelled: usize,
    pub done: usize,
}

impl StatusCounts {
    pub fn tally<'a>(appointments: impl IntoIterator<Item = &'a Appointment>) -> Self {
        let mut counts = Self::default();
        for appointment in appointments {
            counts.total += 1;
            match appointment.status {
                AppointmentStatus::Pending => counts.pending += 1,
                AppointmentStatus::Confirmed => counts.confirmed += 1,
                AppointmentStatus::Cancelled => counts.cancelled += 1,
                AppointmentStatus::Done => counts.done += 1,
            }
        }
        counts
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DoctorDashboard {
    /// Clinic-local date the `today` counts refer to
    pub date: NaiveDate,
    pub today: StatusCounts,
    pub upcoming: StatusCounts,
    /// Soonest upcoming appointments, ascending
    pub next_appointments: Vec<Appointment>,
}

/// Patient history filters; every field is optional
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistoryFilter {
    /// Status literal, case-insensitive; unknown values are ignored
    pub status: Option<String>,
    /// Case-insensitive substring of the reason
    pub q: Option<String>,
    /// Inclusive clinic-local dates
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl HistoryFilter {
    pub fn status(&self) -> Option<AppointmentStatus> {
        let literal = self.status.as_deref()?.trim().to_uppercase();
        AppointmentStatus::from_literal(&literal)
    }

    fn needle(&self) -> Option<String> {
        self.q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub appointment: Appointment,
    pub prescription_count: usize,
}

/// Appointment with its child records, newest records first
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AppointmentDetail {
    pub appointment: Appointment,
    pub notes: Vec<ClinicalNote>,
    pub prescriptions: Vec<Prescription>,
    pub appointment_files: Vec<AppointmentFile>,
    pub medical_files: Vec<MedicalFile>,
}

impl AppointmentService {
    /// Patients get their own appointments, doctors and admins get all.
    /// Most recent start first.
    pub async fn my_appointments(&self, actor: &Actor) -> ClinicResult<Vec<Appointment>> {
        let filter = match role_of(actor) {
            Role::Patient(profile) => AppointmentFilter::for_patient(profile.id),
            Role::DoctorOrAdmin => AppointmentFilter::default(),
        };
        self.appointments.list(&filter).await
    }

    /// The calling doctor's appointments starting on a clinic-local day,
    /// today when `date` is absent
    pub async fn doctor_agenda(
        &self,
        actor: &Actor,
        date: Option<NaiveDate>,
    ) -> ClinicResult<Vec<Appointment>> {
        let role = role_of(actor);
        authorize(actor, &role, Operation::ViewAgenda, None)?;

        let date = date.unwrap_or_else(|| self.config.local_date(self.clock.now()));
        let (start, end) = self.config.local_day_bounds(date);
        let mut agenda = self
            .appointments
            .list(&AppointmentFilter::for_doctor(actor.id).starting_between(start, end))
            .await?;
        agenda.reverse();
        Ok(agenda)
    }

    pub async fn doctor_dashboard(
        &self,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> ClinicResult<DoctorDashboard> {
        let role = role_of(actor);
        authorize(actor, &role, Operation::ViewDashboard, None)?;

        let date = self.config.local_date(now);
        let (day_start, day_end) = self.config.local_day_bounds(date);
        let mine = self
            .appointments
            .list(&AppointmentFilter::for_doctor(actor.id))
            .await?;

        let today = StatusCounts::tally(
            mine.iter()
                .filter(|a| a.start_time >= day_start && a.start_time < day_end),
        );
        let mut upcoming: Vec<Appointment> =
            mine.into_iter().filter(|a| a.start_time >= now).collect();
        upcoming.reverse();

        Ok(DoctorDashboard {
            date,
            today,
            upcoming: StatusCounts::tally(&upcoming),
            next_appointments: upcoming
                .into_iter()
                .take(self.config.dashboard_upcoming_limit)
                .collect(),
        })
    }

    /// Past appointments of the calling patient, newest first, one page at a time
    pub async fn patient_history(
        &self,
        actor: &Actor,
        filter: &HistoryFilter,
        page: Option<usize>,
        now: DateTime<Utc>,
    ) -> ClinicResult<PaginatedResult<HistoryEntry>> {
        let role = role_of(actor);
        authorize(actor, &role, Operation::ViewHistory, None)?;
        let Some(profile) = role.patient_profile() else {
            return Err(ClinicError::PermissionDenied);
        };

        let mut query = AppointmentFilter::for_patient(profile.id).starting_before(now);
        if let Some(status) = filter.status() {
            query = query.with_statuses(&[status]);
        }
        let needle = filter.needle();
        let past: Vec<Appointment> = self
            .appointments
            .list(&query)
            .await?
            .into_iter()
            .filter(|a| {
                needle
                    .as_deref()
                    .map_or(true, |q| a.reason.to_lowercase().contains(q))
            })
            .filter(|a| {
                let day = self.config.local_date(a.start_time);
                filter.from.map_or(true, |from| day >= from) && filter.to.map_or(true, |to| day <= to)
            })
            .collect();

        let window = PaginationInput::for_page(page, self.config.history_page_size, past.len());
        let page = PaginatedResult::paginate(past, &window);
        let mut items = Vec::with_capacity(page.items.len());
        for appointment in page.items {
            let prescription_count = self
                .records
                .records_for(appointment.id)
                .await?
                .iter()
                .filter(|r| matches!(r, ChildRecord::Prescription(_)))
                .count();
            items.push(HistoryEntry {
                appointment,
                prescription_count,
            });
        }
        Ok(PaginatedResult {
            items,
            total: page.total,
            offset: page.offset,
            limit: page.limit,
            has_more: page.has_more,
        })
    }

    /// Appointment and its records. Patients only see notes shared with them.
    pub async fn appointment_detail(
        &self,
        actor: &Actor,
        id: AppointmentId,
    ) -> ClinicResult<AppointmentDetail> {
        let role = role_of(actor);
        let appointment = self
            .authorized_appointment(actor, &role, Operation::ViewAppointment, id)
            .await?;

        let mut detail = AppointmentDetail {
            appointment,
            notes: Vec::new(),
            prescriptions: Vec::new(),
            appointment_files: Vec::new(),
            medical_files: Vec::new(),
        };
        for record in self.records.records_for(id).await? {
            match record {
                ChildRecord::ClinicalNote(note) => {
                    if note.visible_to_patient || !role.is_patient() {
                        detail.notes.push(note);
                    }
                }
                ChildRecord::Prescription(rx) => detail.prescriptions.push(rx),
                ChildRecord::AppointmentFile(file) => detail.appointment_files.push(file),
                ChildRecord::MedicalFile(file) => detail.medical_files.push(file),
            }
        }
        Ok(detail)
    }
}
