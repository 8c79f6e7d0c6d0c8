use super::{next_cron_run, parse_timezone};
use crate::core::{Result, Schedule, ScheduleKind};
use chrono::{DateTime, Utc};

pub fn is_due(schedule: &Schedule, now: DateTime<Utc>) -> bool {
    schedule.is_enabled && schedule.next_run_at.is_some_and(|next| next <= now)
}

/// Due schedules ordered by (next_run_at, created_at, id).
pub fn select_due<'a, I>(schedules: I, now: DateTime<Utc>) -> Vec<Schedule>
where
    I: IntoIterator<Item = &'a Schedule>,
{
    let mut due: Vec<Schedule> = schedules
        .into_iter()
        .filter(|schedule| is_due(schedule, now))
        .cloned()
        .collect();
    due.sort_by(|a, b| {
        a.next_run_at
            .cmp(&b.next_run_at)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
    due
}

/// Applies a finished run to a schedule.
///
/// Returns the updated schedule, or `None` when the call changes nothing:
/// a one-shot that already completed, or a cron schedule already marked at
/// this `finished_at`.
pub fn mark_completed(schedule: &Schedule, finished_at: DateTime<Utc>) -> Result<Option<Schedule>> {
    match schedule.kind {
        ScheduleKind::OneShot => {
            if !schedule.is_enabled && schedule.last_run_at.is_some() {
                return Ok(None);
            }
            let mut updated = schedule.clone();
            updated.last_run_at = Some(finished_at);
            updated.is_enabled = false;
            updated.next_run_at = None;
            Ok(Some(updated))
        }
        ScheduleKind::Cron => {
            if schedule.last_run_at == Some(finished_at) {
                return Ok(None);
            }
            let tz = parse_timezone(&schedule.timezone)?;
            let mut updated = schedule.clone();
            updated.last_run_at = Some(finished_at);
            updated.next_run_at = if updated.is_enabled {
                next_cron_run(&schedule.expression, tz, finished_at)?
            } else {
                None
            };
            Ok(Some(updated))
        }
    }
}
