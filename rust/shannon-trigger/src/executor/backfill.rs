//! Backfill ("complement data") planning.
//!
//! A backfill request covers a historical `[start, end]` range. In SERIAL
//! mode the whole range becomes one command. In PARALLEL mode the range is
//! split into one command per date: the dates the workflow's ONLINE
//! schedules would have fired on, or every calendar day when no schedule
//! fires inside the range.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::database::ScheduleRepository;
use crate::domain::RunMode;
use crate::error::ControlResult;
use crate::scheduler::{CronExpression, CronParser, Schedule};

/// One sub-range of a backfill, turned into one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl PlanEntry {
    /// Entry covering a single instant.
    #[must_use]
    pub fn single(date: DateTime<Utc>) -> Self {
        Self {
            start: date,
            end: date,
        }
    }
}

impl fmt::Display for PlanEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} .. {}", self.start, self.end)
    }
}

/// A cron expression together with the timezone it is evaluated in.
#[derive(Debug, Clone)]
pub struct CronTrigger {
    pub expression: CronExpression,
    pub tz: Tz,
}

impl CronTrigger {
    pub fn parse(crontab: &str, timezone_id: &str) -> ControlResult<Self> {
        Ok(Self {
            expression: CronParser::parse(crontab)?,
            tz: CronParser::parse_timezone(timezone_id)?,
        })
    }

    pub fn from_schedule(schedule: &Schedule) -> ControlResult<Self> {
        Self::parse(&schedule.crontab, &schedule.timezone_id)
    }
}

/// Union of the fire times of `triggers` in `[start, end]`, ascending and
/// without duplicates.
#[must_use]
pub fn fire_dates(
    triggers: &[CronTrigger],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    triggers
        .iter()
        .flat_map(|t| t.expression.fire_times(start, end, t.tz, None))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// `start`, then the same wall-clock time on every following calendar day
/// of `tz`, through the calendar day `end` falls on.
///
/// There is exactly one entry per local date. A wall-clock time repeated by
/// a fall-back transition resolves to its earlier instant; one skipped by a
/// spring-forward gap is read with the offset in force before the gap. The
/// last entry is capped at `end`.
#[must_use]
pub fn calendar_days(start: DateTime<Utc>, end: DateTime<Utc>, tz: Tz) -> Vec<DateTime<Utc>> {
    if start > end {
        return Vec::new();
    }

    let local_start = start.with_timezone(&tz);
    let wall_clock = local_start.time();
    let last_date = end.with_timezone(&tz).date_naive();

    let mut days = vec![start];
    let mut date = local_start.date_naive();
    while let Some(next) = date.succ_opt() {
        if next > last_date {
            break;
        }
        days.push(resolve_wall_clock(tz, next.and_time(wall_clock)).min(end));
        date = next;
    }
    days
}

/// The instant a local wall-clock time denotes in `tz`.
fn resolve_wall_clock(tz: Tz, local: NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(instant) | LocalResult::Ambiguous(instant, _) => {
            instant.with_timezone(&Utc)
        }
        LocalResult::None => {
            let before_gap = tz.offset_from_utc_datetime(&(local - Duration::days(1)));
            let offset = Duration::seconds(i64::from(before_gap.fix().local_minus_utc()));
            Utc.from_utc_datetime(&(local - offset))
        }
    }
}

/// Group ascending `dates` into at most `parallelism` contiguous entries.
///
/// Chunk sizes differ by at most one, earlier chunks taking the remainder.
/// `None` (or zero) yields one entry per date.
#[must_use]
pub fn group_dates(dates: &[DateTime<Utc>], parallelism: Option<usize>) -> Vec<PlanEntry> {
    let chunks = match parallelism {
        Some(n) if n > 0 && n < dates.len() => n,
        _ => return dates.iter().copied().map(PlanEntry::single).collect(),
    };

    let base = dates.len() / chunks;
    let extra = dates.len() % chunks;
    let mut entries = Vec::with_capacity(chunks);
    let mut offset = 0;
    for i in 0..chunks {
        let size = base + usize::from(i < extra);
        let chunk = &dates[offset..offset + size];
        entries.push(PlanEntry {
            start: chunk[0],
            end: chunk[size - 1],
        });
        offset += size;
    }
    entries
}

/// Plan a backfill against an already loaded set of triggers.
///
/// An inverted window (`start > end`) yields no entries.
#[must_use]
pub fn plan_with_triggers(
    triggers: &[CronTrigger],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    run_mode: RunMode,
    expected_parallelism: Option<usize>,
    calendar_tz: Tz,
) -> Vec<PlanEntry> {
    if start > end {
        warn!(%start, %end, "Backfill window is inverted, nothing to plan");
        return Vec::new();
    }

    match run_mode {
        RunMode::Serial => vec![PlanEntry { start, end }],
        RunMode::Parallel => {
            let mut dates = fire_dates(triggers, start, end);
            if dates.is_empty() {
                debug!(%start, %end, "No schedule fires in window, stepping calendar days");
                dates = calendar_days(start, end, calendar_tz);
            }
            group_dates(&dates, expected_parallelism)
        }
    }
}

/// Splits backfill windows using the workflow's ONLINE schedules.
#[derive(Clone)]
pub struct BackfillPlanner {
    schedules: Arc<dyn ScheduleRepository>,
    calendar_tz: Tz,
}

impl fmt::Debug for BackfillPlanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackfillPlanner")
            .field("calendar_tz", &self.calendar_tz)
            .finish_non_exhaustive()
    }
}

impl BackfillPlanner {
    /// `calendar_tz` decides where day boundaries fall when no schedule fires.
    #[must_use]
    pub fn new(schedules: Arc<dyn ScheduleRepository>, calendar_tz: Tz) -> Self {
        Self {
            schedules,
            calendar_tz,
        }
    }

    /// Sub-ranges to create backfill commands for; the length is the
    /// number of commands.
    pub async fn plan(
        &self,
        workflow_code: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        run_mode: RunMode,
        expected_parallelism: Option<usize>,
    ) -> ControlResult<Vec<PlanEntry>> {
        let triggers = if run_mode == RunMode::Parallel && start <= end {
            self.schedules
                .select_online_by_workflow(workflow_code)
                .await?
                .iter()
                .map(CronTrigger::from_schedule)
                .collect::<ControlResult<Vec<_>>>()?
        } else {
            Vec::new()
        };

        let entries = plan_with_triggers(
            &triggers,
            start,
            end,
            run_mode,
            expected_parallelism,
            self.calendar_tz,
        );
        debug!(
            workflow_code = workflow_code,
            run_mode = ?run_mode,
            schedules = triggers.len(),
            entries = entries.len(),
            "Backfill planned"
        );
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_serial_is_one_entry() {
        let entries = plan_with_triggers(&[], day(1), day(5), RunMode::Serial, None, Tz::UTC);
        assert_eq!(entries, vec![PlanEntry { start: day(1), end: day(5) }]);
    }

    #[test]
    fn test_inverted_window_plans_nothing() {
        let entries = plan_with_triggers(&[], day(5), day(1), RunMode::Parallel, None, Tz::UTC);
        assert!(entries.is_empty());
    }

    #[test]
    fn test_fire_dates_union_deduplicates() {
        let triggers = vec![
            CronTrigger::parse("0 0 0 1,3 1 *", "UTC").unwrap(),
            CronTrigger::parse("0 0 0 3,4 1 *", "UTC").unwrap(),
        ];
        assert_eq!(
            fire_dates(&triggers, day(1), day(5)),
            vec![day(1), day(3), day(4)]
        );
    }

    #[test]
    fn test_calendar_days_in_shanghai() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 16, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 3, 16, 0, 0).unwrap();
        let tz = CronParser::parse_timezone("Asia/Shanghai").unwrap();
        assert_eq!(calendar_days(start, end, tz).len(), 3);
    }

    fn new_york() -> Tz {
        CronParser::parse_timezone("America/New_York").unwrap()
    }

    fn local_dates(days: &[DateTime<Utc>], tz: Tz) -> Vec<chrono::NaiveDate> {
        days.iter().map(|d| d.with_timezone(&tz).date_naive()).collect()
    }

    #[test]
    fn test_calendar_days_across_spring_forward() {
        // 02:30 EST; 2024-03-10 02:30 does not exist in New York.
        let tz = new_york();
        let start = Utc.with_ymd_and_hms(2024, 3, 5, 7, 30, 0).unwrap();
        let end = start + Duration::days(14);

        let days = calendar_days(start, end, tz);
        assert_eq!(days.len(), 15);
        let dates = local_dates(&days, tz);
        assert!(dates.windows(2).all(|w| w[1] == w[0].succ_opt().unwrap()));

        let gap_day = days[5].with_timezone(&tz);
        assert_eq!(gap_day.date_naive().to_string(), "2024-03-10");
        assert_eq!(gap_day.format("%H:%M").to_string(), "03:30");
        assert_eq!(days[6].with_timezone(&tz).format("%H:%M").to_string(), "02:30");
    }

    #[test]
    fn test_calendar_days_across_fall_back() {
        // 01:30 EDT; 2024-11-03 01:30 happens twice in New York.
        let tz = new_york();
        let start = Utc.with_ymd_and_hms(2024, 10, 30, 5, 30, 0).unwrap();
        let end = start + Duration::days(11);

        let days = calendar_days(start, end, tz);
        assert_eq!(days.len(), 12);
        let dates = local_dates(&days, tz);
        assert!(dates.windows(2).all(|w| w[1] == w[0].succ_opt().unwrap()));

        // The earlier (EDT) 01:30 is used on the repeated day.
        assert_eq!(days[4], Utc.with_ymd_and_hms(2024, 11, 3, 5, 30, 0).unwrap());
        assert_eq!(*days.last().unwrap(), end);

        let planned = plan_with_triggers(&[], start, end, RunMode::Parallel, None, tz);
        assert_eq!(planned.len(), 12);
    }

    #[test]
    fn test_group_dates_front_loads_remainder() {
        let dates: Vec<_> = (1..=5).map(day).collect();
        let entries = group_dates(&dates, Some(2));
        assert_eq!(
            entries,
            vec![
                PlanEntry { start: day(1), end: day(3) },
                PlanEntry { start: day(4), end: day(5) },
            ]
        );

        assert_eq!(group_dates(&dates, Some(10)).len(), 5);
        assert_eq!(group_dates(&dates, Some(0)).len(), 5);
    }
}
