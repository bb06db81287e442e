//! Schedule input validation.

use chrono::{DateTime, Utc};

use super::cron::CronParser;
use super::ScheduleParams;
use crate::error::{ControlError, ControlResult};

/// Side-effect free checks run before a schedule is persisted.
#[derive(Debug)]
pub struct ScheduleValidator;

impl ScheduleValidator {
    /// Validate a full set of schedule parameters.
    ///
    /// Order is window, then cron, then timezone: a bad window is reported
    /// even when the cron string is also broken.
    pub fn validate(params: &ScheduleParams) -> ControlResult<()> {
        Self::validate_window(params.start_time, params.end_time)?;
        Self::validate_cron(&params.crontab)?;
        Self::validate_timezone(&params.timezone_id)
    }

    /// The window must be non-empty: `start` strictly before `end`.
    pub fn validate_window(start: DateTime<Utc>, end: DateTime<Utc>) -> ControlResult<()> {
        if start >= end {
            return Err(ControlError::invalid_window(start, end));
        }
        Ok(())
    }

    /// Syntactic cron validation.
    pub fn validate_cron(expr: &str) -> ControlResult<()> {
        CronParser::validate(expr).map_err(|e| ControlError::InvalidCronExpression {
            expression: expr.to_string(),
            reason: e.to_string(),
        })
    }

    /// The timezone must be a known IANA id.
    pub fn validate_timezone(timezone_id: &str) -> ControlResult<()> {
        CronParser::parse_timezone(timezone_id).map(|_| ())
    }
}
