//! Clinic configuration
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `CLINIC__*` environment variables (for example `CLINIC__UTC_OFFSET_MINUTES=-360`).

use std::path::Path;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::PaginationInput;

/// Upper bound for reminder lead and window settings (one year)
pub const MAX_REMINDER_HOURS: i64 = 24 * 366;

/// Default clinic offset: America/Costa_Rica (UTC-6, no DST)
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = -360;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid UTC offset of {0} minutes")]
    InvalidOffset(i32),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClinicConfig {
    /// Offset of the clinic's local time from UTC, used for calendar days
    pub utc_offset_minutes: i32,
    /// How far ahead reminders look
    pub reminder_lead_hours: i64,
    /// Width of the reminder selection window
    pub reminder_window_hours: i64,
    pub history_page_size: usize,
    pub dashboard_upcoming_limit: usize,
    /// Block doctors from moving appointments out of DONE/CANCELLED
    pub strict_doctor_transitions: bool,
}

impl Default for ClinicConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
            reminder_lead_hours: 24,
            reminder_window_hours: 1,
            history_page_size: 10,
            dashboard_upcoming_limit: 10,
            strict_doctor_transitions: false,
        }
    }
}

impl ClinicConfig {
    /// Load defaults, then `path` if given, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&ClinicConfig::default())?);
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let loaded: ClinicConfig = builder
            .add_source(
                Environment::with_prefix("CLINIC")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timezone()?;
        if self.history_page_size == 0 || self.history_page_size > PaginationInput::MAX_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "history_page_size must be between 1 and {}",
                PaginationInput::MAX_LIMIT
            )));
        }
        if !(0..=MAX_REMINDER_HOURS).contains(&self.reminder_lead_hours) {
            return Err(ConfigError::Invalid(format!(
                "reminder_lead_hours must be between 0 and {}",
                MAX_REMINDER_HOURS
            )));
        }
        if !(1..=MAX_REMINDER_HOURS).contains(&self.reminder_window_hours) {
            return Err(ConfigError::Invalid(format!(
                "reminder_window_hours must be between 1 and {}",
                MAX_REMINDER_HOURS
            )));
        }
        Ok(())
    }

    pub fn timezone(&self) -> Result<FixedOffset, ConfigError> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .ok_or(ConfigError::InvalidOffset(self.utc_offset_minutes))
    }

    fn offset(&self) -> Duration {
        Duration::minutes(i64::from(self.utc_offset_minutes))
    }

    /// Local calendar date of an instant
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        (instant.naive_utc() + self.offset()).date()
    }

    /// Half-open `[start, end)` bounds of a local calendar day, in UTC
    pub fn local_day_bounds(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let local_midnight = date.and_time(NaiveTime::MIN);
        let start = Utc.from_utc_datetime(&(local_midnight - self.offset()));
        (start, start + Duration::days(1))
    }

    /// Local wall-clock rendering used on documents
    pub fn format_local(&self, instant: DateTime<Utc>) -> String {
        (instant.naive_utc() + self.offset())
            .format("%Y-%m-%d %H:%M")
            .to_string()
    }
}
