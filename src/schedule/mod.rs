//! Six-field cron schedules (`sec min hour day-of-month month day-of-week`).
//!
//! Parsing and next-fire search are delegated to the `cron` crate; this
//! wrapper pins the field count to six and keeps the normalised expression
//! for logging. Weekdays count `1-7` from Sunday, or use `Sun`-`Sat` names.
//! All times are UTC.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use thiserror::Error;

const FIELD_COUNT: usize = 6;

/// Errors raised while parsing a cron expression.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScheduleError {
    /// The expression did not have exactly six fields.
    #[error("cron expression `{expression}` has {found} fields; expected 6")]
    FieldCount {
        /// Expression as supplied.
        expression: String,
        /// Number of whitespace-separated fields found.
        found: usize,
    },
    /// The cron parser rejected the expression.
    #[error("invalid cron expression `{expression}`: {message}")]
    Invalid {
        /// Normalised expression.
        expression: String,
        /// Parser message.
        message: String,
    },
}

/// A parsed schedule.
#[derive(Clone, Debug)]
pub struct CronSchedule {
    expression: String,
    schedule: cron::Schedule,
}

impl CronSchedule {
    /// Parses a six-field expression.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::FieldCount`] when the expression does not have
    /// six fields and [`ScheduleError::Invalid`] when a field is malformed.
    pub fn parse(expression: &str) -> Result<Self, ScheduleError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != FIELD_COUNT {
            return Err(ScheduleError::FieldCount {
                expression: expression.to_owned(),
                found: fields.len(),
            });
        }

        let normalised = fields.join(" ");
        let schedule =
            cron::Schedule::from_str(&normalised).map_err(|err| ScheduleError::Invalid {
                expression: normalised.clone(),
                message: err.to_string(),
            })?;
        Ok(Self {
            expression: normalised,
            schedule,
        })
    }

    /// Normalised expression text.
    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First firing strictly after `after`, or `None` when the schedule never
    /// fires again (for example `0 0 0 30 2 *`).
    #[must_use]
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }
}

impl PartialEq for CronSchedule {
    fn eq(&self, other: &Self) -> bool {
        self.expression == other.expression
    }
}

impl Eq for CronSchedule {}

impl FromStr for CronSchedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}
