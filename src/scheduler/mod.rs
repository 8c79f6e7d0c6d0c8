// ============================================================================
// Automation Scheduling
// ============================================================================
//
// Pure functions over `Schedule` values. The command layer calls them inside
// write transactions; nothing here touches the store.
//
//   Disabled
//   Pending ──(next_run_at <= now)──> Due ──mark_completed──> Completed   (one-shot)
//                                        └─────mark_completed──> Pending  (cron)
//
// ============================================================================

pub mod cadence;
pub mod due;

use crate::core::{Result, Schedule, ScheduleKind};
use chrono::{DateTime, Utc};

pub use cadence::{
    next_cron_run, parse_cron, parse_one_shot, parse_timezone, upcoming_cron_runs,
    validate_expression,
};
pub use due::{is_due, mark_completed, select_due};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleState {
    Disabled,
    Pending,
    Due,
    /// A one-shot that has run.
    Completed,
}

/// Next run for a schedule as of `now`.
///
/// The expression is validated even for disabled schedules, which always
/// yield `None`. A one-shot yields its instant verbatim, even when it is
/// already in the past.
pub fn compute_next_run(
    kind: ScheduleKind,
    expression: &str,
    timezone: &str,
    is_enabled: bool,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>> {
    let tz = parse_timezone(timezone)?;
    let next = match kind {
        ScheduleKind::Cron => next_cron_run(expression, tz, now)?,
        ScheduleKind::OneShot => Some(parse_one_shot(expression, tz)?),
    };
    Ok(if is_enabled { next } else { None })
}

/// Recomputes `next_run_at` in place from the schedule's own fields.
pub fn rearm(schedule: &mut Schedule, now: DateTime<Utc>) -> Result<()> {
    schedule.next_run_at = compute_next_run(
        schedule.kind,
        &schedule.expression,
        &schedule.timezone,
        schedule.is_enabled,
        now,
    )?;
    Ok(())
}

pub fn schedule_state(schedule: &Schedule, now: DateTime<Utc>) -> ScheduleState {
    if schedule.kind == ScheduleKind::OneShot
        && !schedule.is_enabled
        && schedule.last_run_at.is_some()
    {
        return ScheduleState::Completed;
    }
    if !schedule.is_enabled {
        return ScheduleState::Disabled;
    }
    if is_due(schedule, now) {
        ScheduleState::Due
    } else {
        ScheduleState::Pending
    }
}
