//! Appointments Coordinator
//!
//! Operations over the appointment entry types:
//! - Booking and editing with per-doctor double-booking prevention
//! - Role-scoped status transitions
//! - Clinical notes, prescriptions and attached files
//! - Agenda, dashboard, history and detail views
//! - Prescription documents, e-mail delivery and reminders
//!
//! Every operation goes through [`AppointmentService`], which checks role and
//! ownership before touching storage and records one audit entry per success.

pub mod conflict;
pub mod documents;
pub mod gate;
pub mod queries;
pub mod records;
pub mod reminders;
pub mod repository;
pub mod status;
pub mod store;

#[cfg(test)]
mod testing;

pub use conflict::ConflictChecker;
pub use documents::{
    DocumentError, DocumentRenderer, LogNotificationSink, MemoryNotificationSink,
    NotificationError, NotificationSink, OutgoingMessage, PlainTextRenderer, PrescriptionDocument,
    PrescriptionLine, RenderedDocument,
};
pub use gate::AppointmentService;
pub use queries::{AppointmentDetail, DoctorDashboard, HistoryEntry, HistoryFilter, StatusCounts};
pub use reminders::Reminder;
pub use repository::{
    AppointmentFilter, AppointmentRepository, CalendarGuard, NewActor, NewAppointment,
    PatientDetails, PatientRepository, RecordRepository,
};
pub use status::{
    PatientAction, PermissiveDoctorPolicy, StatusPolicy, StatusTransitionEngine,
    TerminalGuardPolicy,
};
pub use store::InMemoryClinicStore;
