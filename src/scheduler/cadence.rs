use crate::core::{Result, ScheduleKind, StoreError};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use std::str::FromStr;

const DAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

const NAIVE_FORMATS: [&str; 5] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| StoreError::invalid_input(format!("invalid timezone: {}", name)))
}

/// Parses a standard five-field cron expression.
///
/// Day-of-week accepts 0-7 (0 and 7 are Sunday) and three-letter names.
/// Matching requires both the day-of-month and day-of-week fields.
pub fn parse_cron(expression: &str) -> Result<CronSchedule> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(StoreError::invalid_input(format!(
            "cron expression '{}' must have 5 fields, found {}",
            expression,
            fields.len()
        )));
    }
    let day_of_week = translate_day_of_week(fields[4]).map_err(|reason| {
        StoreError::invalid_input(format!("cron expression '{}': {}", expression, reason))
    })?;
    // The cron crate wants seconds first and counts weekdays from 1.
    let full = format!(
        "0 {} {} {} {} {}",
        fields[0], fields[1], fields[2], fields[3], day_of_week
    );
    CronSchedule::from_str(&full).map_err(|e| {
        StoreError::invalid_input(format!("invalid cron expression '{}': {}", expression, e))
    })
}

/// First cron occurrence strictly after `after`, evaluated in `tz`.
pub fn next_cron_run(
    expression: &str,
    tz: Tz,
    after: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>> {
    Ok(upcoming_cron_runs(expression, tz, after, 1)?.into_iter().next())
}

/// Next `count` cron occurrences strictly after `after`.
///
/// Candidates are generated as wall-clock times and resolved in `tz`: a time
/// inside a DST gap is skipped, a time that occurs twice fires once, at its
/// earlier instant.
pub fn upcoming_cron_runs(
    expression: &str,
    tz: Tz,
    after: DateTime<Utc>,
    count: usize,
) -> Result<Vec<DateTime<Utc>>> {
    let schedule = parse_cron(expression)?;
    // Utc stands in for a zone-less wall clock while the cron crate iterates.
    let wall_clock = Utc.from_utc_datetime(&after.with_timezone(&tz).naive_local());
    Ok(schedule
        .after(&wall_clock)
        .filter_map(|candidate| {
            tz.from_local_datetime(&candidate.naive_utc())
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
        })
        .filter(|dt| *dt > after)
        .take(count)
        .collect())
}

/// Parses a one-shot instant: RFC 3339, or a naive local time in `tz`.
pub fn parse_one_shot(expression: &str, tz: Tz) -> Result<DateTime<Utc>> {
    let trimmed = expression.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(instant.with_timezone(&Utc));
    }
    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .ok_or_else(|| {
            StoreError::invalid_input(format!("invalid one-shot timestamp '{}'", expression))
        })?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| {
            StoreError::invalid_input(format!(
                "'{}' does not exist in timezone {}",
                expression,
                tz.name()
            ))
        })
}

/// Rejects malformed expressions and unknown timezones.
pub fn validate_expression(kind: ScheduleKind, expression: &str, timezone: &str) -> Result<()> {
    let tz = parse_timezone(timezone)?;
    match kind {
        ScheduleKind::Cron => parse_cron(expression).map(|_| ()),
        ScheduleKind::OneShot => parse_one_shot(expression, tz).map(|_| ()),
    }
}

fn translate_day_of_week(field: &str) -> std::result::Result<String, String> {
    if field == "*" || field == "?" {
        return Ok("*".to_string());
    }
    let mut days = [false; 7];
    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: usize = step
                    .parse()
                    .map_err(|_| format!("invalid day-of-week step '{}'", step))?;
                if step == 0 {
                    return Err("day-of-week step must be positive".to_string());
                }
                (range, step)
            }
            None => (part, 1),
        };
        let (start, end) = if range == "*" {
            (0, 6)
        } else if let Some((low, high)) = range.split_once('-') {
            (parse_day(low)?, parse_day(high)?)
        } else {
            let day = parse_day(range)?;
            // "5/2" means every second day starting at 5.
            if part.contains('/') { (day, 6) } else { (day, day) }
        };
        if start > end {
            return Err(format!("invalid day-of-week range '{}'", range));
        }
        for day in (start..=end).step_by(step) {
            days[day % 7] = true;
        }
    }
    if days.iter().all(|set| *set) {
        return Ok("*".to_string());
    }
    let names: Vec<&str> = days
        .iter()
        .enumerate()
        .filter(|(_, set)| **set)
        .map(|(index, _)| DAY_NAMES[index])
        .collect();
    Ok(names.join(","))
}

fn parse_day(token: &str) -> std::result::Result<usize, String> {
    if let Ok(number) = token.parse::<usize>() {
        return if number <= 7 {
            Ok(number)
        } else {
            Err(format!("day-of-week {} out of range 0-7", number))
        };
    }
    let lowered = token.to_ascii_lowercase();
    DAY_NAMES
        .iter()
        .position(|name| lowered.starts_with(&name.to_ascii_lowercase()) && lowered.len() >= 3)
        .ok_or_else(|| format!("unknown day-of-week '{}'", token))
}
