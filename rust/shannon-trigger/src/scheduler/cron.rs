//! Cron expression parsing and evaluation.
//!
//! Expressions use the seconds-first format understood by the `cron` crate:
//! `second minute hour day-of-month month day-of-week [year]`.
//! Fire times are evaluated in an IANA timezone and returned in UTC.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use thiserror::Error;

use crate::error::{ControlError, ControlResult};

/// Malformed cron input.
#[derive(Debug, Error)]
pub enum CronError {
    #[error("cron expression is empty")]
    Empty,

    #[error("'{expression}': {reason}")]
    Malformed { expression: String, reason: String },
}

/// A parsed cron expression.
#[derive(Debug, Clone)]
pub struct CronExpression {
    /// Expression as written by the user (trimmed).
    source: String,
    schedule: cron::Schedule,
}

/// Cron expression parser.
#[derive(Debug)]
pub struct CronParser;

impl CronParser {
    /// Parse a cron expression string.
    ///
    /// # Examples
    ///
    /// - `0 0 0 * * *` - Daily at midnight
    /// - `0 */5 * * * *` - Every 5 minutes
    /// - `0 0 9-17 * * Mon-Fri` - Every hour 9am-5pm, Monday-Friday
    pub fn parse(expr: &str) -> Result<CronExpression, CronError> {
        let source = expr.trim();
        if source.is_empty() {
            return Err(CronError::Empty);
        }

        let schedule = cron::Schedule::from_str(source).map_err(|e| CronError::Malformed {
            expression: source.to_string(),
            reason: e.to_string(),
        })?;

        Ok(CronExpression {
            source: source.to_string(),
            schedule,
        })
    }

    /// Syntactic validation only; an expression that never fires is valid.
    pub fn validate(expr: &str) -> Result<(), CronError> {
        Self::parse(expr).map(|_| ())
    }

    /// Resolve an IANA timezone id such as `Asia/Shanghai`.
    pub fn parse_timezone(timezone_id: &str) -> ControlResult<Tz> {
        timezone_id
            .parse::<Tz>()
            .ok()
            .ok_or_else(|| ControlError::InvalidTimezone(timezone_id.to_string()))
    }
}

impl CronExpression {
    /// Every fire time within `[start, end]`, ascending.
    ///
    /// Evaluation happens in `tz`; results are UTC instants. Stops after
    /// `max_count` results when given. Returns an empty list when the
    /// expression does not fire inside the window.
    #[must_use]
    pub fn fire_times(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        tz: Tz,
        max_count: Option<usize>,
    ) -> Vec<DateTime<Utc>> {
        if start > end {
            return Vec::new();
        }

        // `after` is exclusive; step back one second so `start` itself can fire.
        let from = (start - Duration::seconds(1)).with_timezone(&tz);
        let fires = self
            .schedule
            .after(&from)
            .map(|t| t.with_timezone(&Utc))
            .take_while(|t| *t <= end)
            .filter(|t| *t >= start);

        match max_count {
            Some(limit) => fires.take(limit).collect(),
            None => fires.collect(),
        }
    }
}

impl fmt::Display for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
