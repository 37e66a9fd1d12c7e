//! Clinic Replay CLI
//!
//! Replays a JSON scenario against an in-memory clinic and prints one JSON
//! line per step.
//!
//! Usage:
//!   clinic-replay run <scenario.json> [--config <clinic.toml>] [--audit]
//!   clinic-replay config [--config <clinic.toml>]
//!
//! Scenario shape:
//!   {
//!     "now": "2025-03-10T12:00:00Z",
//!     "actors": [
//!       { "username": "dr.rojas", "full_name": "Elena Rojas" },
//!       { "username": "ana", "email": "ana@example.com", "patient": { "phone": "8888-0000" } }
//!     ],
//!     "steps": [
//!       { "op": "create", "actor": "dr.rojas", "patient": "ana",
//!         "start_time": "2025-03-11T15:00:00Z", "end_time": "2025-03-11T16:00:00Z" },
//!       { "op": "confirm", "actor": "ana", "appointment": 1 }
//!     ]
//!   }

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use appointments::{
    AppointmentService, HistoryFilter, InMemoryClinicStore, NewActor, PatientDetails,
    PatientRepository,
};
use appointments_integrity::{AppointmentInput, NoteInput, PrescriptionInput};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use clinic_shared::config::ClinicConfig;
use clinic_shared::{
    Actor, AppointmentId, AuditSink, ClinicError, ClinicResult, Clock, FixedClock, LogAuditSink,
    MemoryAuditSink, ValidationErrorCode,
};
use log::{debug, info};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "clinic-replay")]
#[command(version = "0.1.0")]
#[command(about = "Replay clinic scenarios against an in-memory store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); CLINIC__* environment variables apply on top
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario file
    Run {
        scenario: PathBuf,

        /// Print the audit trail after the steps
        #[arg(long)]
        audit: bool,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Deserialize)]
struct Scenario {
    now: Option<DateTime<Utc>>,
    #[serde(default)]
    actors: Vec<ScenarioActor>,
    #[serde(default)]
    steps: Vec<Step>,
}

#[derive(Deserialize)]
struct ScenarioActor {
    username: String,
    #[serde(default)]
    full_name: String,
    email: Option<String>,
    /// Present for patients
    patient: Option<PatientDetails>,
}

/// Appointment fields with the patient named by username
#[derive(Deserialize, Default)]
#[serde(default)]
struct Booking {
    patient: Option<String>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    reason: String,
    status: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Step {
    Create {
        actor: String,
        #[serde(flatten)]
        booking: Booking,
    },
    Edit {
        actor: String,
        appointment: AppointmentId,
        #[serde(flatten)]
        booking: Booking,
    },
    SetStatus {
        actor: String,
        appointment: AppointmentId,
        status: String,
    },
    Confirm {
        actor: String,
        appointment: AppointmentId,
    },
    Cancel {
        actor: String,
        appointment: AppointmentId,
    },
    AddNote {
        actor: String,
        appointment: AppointmentId,
        #[serde(flatten)]
        note: NoteInput,
    },
    AddPrescription {
        actor: String,
        appointment: AppointmentId,
        #[serde(flatten)]
        prescription: PrescriptionInput,
    },
    MyAppointments {
        actor: String,
    },
    Agenda {
        actor: String,
        date: Option<NaiveDate>,
    },
    Dashboard {
        actor: String,
    },
    History {
        actor: String,
        #[serde(default)]
        filter: HistoryFilter,
        page: Option<usize>,
    },
    Detail {
        actor: String,
        appointment: AppointmentId,
    },
    Export {
        actor: String,
        appointment: AppointmentId,
    },
    Email {
        actor: String,
        appointment: AppointmentId,
    },
    SendReminders,
    /// Move the scenario clock
    AdvanceClock {
        to: DateTime<Utc>,
    },
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Step::Create { .. } => "create",
            Step::Edit { .. } => "edit",
            Step::SetStatus { .. } => "set_status",
            Step::Confirm { .. } => "confirm",
            Step::Cancel { .. } => "cancel",
            Step::AddNote { .. } => "add_note",
            Step::AddPrescription { .. } => "add_prescription",
            Step::MyAppointments { .. } => "my_appointments",
            Step::Agenda { .. } => "agenda",
            Step::Dashboard { .. } => "dashboard",
            Step::History { .. } => "history",
            Step::Detail { .. } => "detail",
            Step::Export { .. } => "export",
            Step::Email { .. } => "email",
            Step::SendReminders => "send_reminders",
            Step::AdvanceClock { .. } => "advance_clock",
        }
    }
}

struct Replay {
    service: AppointmentService,
    clock: Arc<FixedClock>,
    actors: HashMap<String, Actor>,
}

impl Replay {
    fn actor(&self, username: &str) -> ClinicResult<&Actor> {
        self.actors.get(username).ok_or_else(|| {
            ClinicError::invalid(
                "actor",
                &format!("unknown actor '{}'", username),
                ValidationErrorCode::InvalidReference,
            )
        })
    }

    fn input(&self, booking: Booking) -> ClinicResult<AppointmentInput> {
        let patient_id = match booking.patient.as_deref() {
            None => None,
            Some(username) => match self.actor(username)?.patient_profile.as_ref() {
                Some(profile) => Some(profile.id),
                None => {
                    return Err(ClinicError::invalid(
                        "patient",
                        &format!("'{}' is not a patient", username),
                        ValidationErrorCode::InvalidReference,
                    ))
                }
            },
        };
        Ok(AppointmentInput {
            patient_id,
            start_time: booking.start_time,
            end_time: booking.end_time,
            reason: booking.reason,
            status: booking.status,
        })
    }

    async fn apply(&self, step: Step) -> ClinicResult<Value> {
        let now = self.clock.now();
        match step {
            Step::Create { actor, booking } => {
                let input = self.input(booking)?;
                to_json(self.service.create(self.actor(&actor)?, input).await?)
            }
            Step::Edit {
                actor,
                appointment,
                booking,
            } => {
                let input = self.input(booking)?;
                to_json(self.service.edit(self.actor(&actor)?, appointment, input).await?)
            }
            Step::SetStatus {
                actor,
                appointment,
                status,
            } => to_json(
                self.service
                    .set_status(self.actor(&actor)?, appointment, &status)
                    .await?,
            ),
            Step::Confirm { actor, appointment } => {
                to_json(self.service.confirm(self.actor(&actor)?, appointment).await?)
            }
            Step::Cancel { actor, appointment } => {
                to_json(self.service.cancel(self.actor(&actor)?, appointment).await?)
            }
            Step::AddNote {
                actor,
                appointment,
                note,
            } => to_json(
                self.service
                    .add_clinical_note(self.actor(&actor)?, appointment, note)
                    .await?,
            ),
            Step::AddPrescription {
                actor,
                appointment,
                prescription,
            } => to_json(
                self.service
                    .add_prescription(self.actor(&actor)?, appointment, prescription)
                    .await?,
            ),
            Step::MyAppointments { actor } => {
                to_json(self.service.my_appointments(self.actor(&actor)?).await?)
            }
            Step::Agenda { actor, date } => {
                to_json(self.service.doctor_agenda(self.actor(&actor)?, date).await?)
            }
            Step::Dashboard { actor } => {
                to_json(self.service.doctor_dashboard(self.actor(&actor)?, now).await?)
            }
            Step::History {
                actor,
                filter,
                page,
            } => to_json(
                self.service
                    .patient_history(self.actor(&actor)?, &filter, page, now)
                    .await?,
            ),
            Step::Detail { actor, appointment } => {
                to_json(self.service.appointment_detail(self.actor(&actor)?, appointment).await?)
            }
            Step::Export { actor, appointment } => {
                let document = self
                    .service
                    .prescription_document(self.actor(&actor)?, appointment)
                    .await?;
                Ok(json!({
                    "file_name": document.file_name,
                    "content_type": document.content_type,
                    "text": String::from_utf8_lossy(&document.bytes),
                }))
            }
            Step::Email { actor, appointment } => {
                let to = self
                    .service
                    .email_prescriptions(self.actor(&actor)?, appointment)
                    .await?;
                Ok(json!({ "sent_to": to }))
            }
            Step::SendReminders => Ok(json!({ "sent": self.service.send_reminders(now).await? })),
            Step::AdvanceClock { to } => {
                self.clock.set(to);
                Ok(json!({ "now": to }))
            }
        }
    }
}

fn to_json<T: serde::Serialize>(value: T) -> ClinicResult<Value> {
    serde_json::to_value(value)
        .map_err(|err| ClinicError::Storage(format!("cannot serialize step result: {}", err)))
}

async fn run(config: ClinicConfig, scenario: PathBuf, print_audit: bool) -> Result<(), Box<dyn std::error::Error>> {
    let scenario: Scenario = serde_json::from_str(&std::fs::read_to_string(&scenario)?)?;
    let clock = Arc::new(FixedClock::new(scenario.now.unwrap_or_else(Utc::now)));
    let store = Arc::new(InMemoryClinicStore::with_clock(clock.clone()));
    let memory_audit = Arc::new(MemoryAuditSink::new());
    let audit: Arc<dyn AuditSink> = if print_audit {
        memory_audit.clone()
    } else {
        Arc::new(LogAuditSink)
    };

    let mut actors = HashMap::new();
    for entry in scenario.actors {
        let mut actor = store
            .register_actor(NewActor {
                username: entry.username.clone(),
                full_name: entry.full_name,
                email: entry.email,
            })
            .await?;
        if let Some(details) = entry.patient {
            actor = store.attach_patient_profile(actor.id, details).await?;
        }
        debug!("scenario actor {} -> {}", entry.username, actor.id);
        actors.insert(entry.username, actor);
    }

    let replay = Replay {
        service: AppointmentService::new(store)
            .with_config(config)?
            .with_audit_sink(audit)
            .with_clock(clock.clone()),
        clock,
        actors,
    };

    let total = scenario.steps.len();
    for (index, step) in scenario.steps.into_iter().enumerate() {
        let op = step.name();
        let line = match replay.apply(step).await {
            Ok(result) => json!({ "step": index + 1, "op": op, "ok": true, "result": result }),
            Err(err) => json!({
                "step": index + 1,
                "op": op,
                "ok": false,
                "error": { "kind": err.kind(), "message": err.to_string() },
            }),
        };
        println!("{}", line);
    }
    info!("replayed {} step(s)", total);

    if print_audit {
        for entry in memory_audit.entries() {
            println!("{}", json!({ "audit": entry }));
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();
    let config = ClinicConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { scenario, audit } => run(config, scenario, audit).await,
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
