//! Next-fire-time computation for the three trigger kinds.
//!
//! Calendar-month intervals are computed same-day-of-month, clamping to the
//! last day of the target month when that day doesn't exist (2024-01-31 + 1
//! month -> 2024-02-29).

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use std::str::FromStr;

use crate::model::{IntervalUnit, Trigger};

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let first_of_next = NaiveDate::from_ymd_opt(next_year, next_month, 1).expect("valid month");
    let first_of_this = NaiveDate::from_ymd_opt(year, month, 1).expect("valid month");
    (first_of_next - first_of_this).num_days() as u32
}

fn add_months_clamped(dt: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    let total = dt.year() as i64 * 12 + (dt.month() as i64 - 1) + months as i64;
    let year = (total / 12) as i32;
    let month = (total % 12) as u32 + 1;
    let day = dt.day().min(days_in_month(year, month));
    let date = NaiveDate::from_ymd_opt(year, month, day).expect("clamped day is valid");
    Utc.from_utc_datetime(&date.and_time(dt.time()))
}

/// Advance `from` by one interval of `amount` `unit`s.
pub fn advance_interval(from: DateTime<Utc>, amount: u32, unit: IntervalUnit) -> DateTime<Utc> {
    match unit {
        IntervalUnit::Minutes => from + chrono::Duration::minutes(amount as i64),
        IntervalUnit::Hours => from + chrono::Duration::hours(amount as i64),
        IntervalUnit::Days => from + chrono::Duration::days(amount as i64),
        IntervalUnit::Weeks => from + chrono::Duration::weeks(amount as i64),
        IntervalUnit::Months => add_months_clamped(from, amount),
    }
}

/// Next fire time strictly after `after`, for a CRON expression.
///
/// `expression` is the 5-field `min hour dom month dow` form; the `cron`
/// crate's parser additionally requires a leading seconds field, so a
/// fixed `0` is prepended before parsing.
pub fn next_cron_fire(expression: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>, String> {
    let with_seconds = format!("0 {expression}");
    let schedule = cron::Schedule::from_str(&with_seconds)
        .map_err(|e| format!("invalid cron expression '{expression}': {e}"))?;
    schedule
        .after(&after)
        .next()
        .ok_or_else(|| format!("cron expression '{expression}' has no future occurrence"))
}

/// Compute the event's next fire time after it has just fired at `fired_at`.
/// `Once` triggers have no next fire (the caller transitions the event to
/// COMPLETED instead of calling this).
pub fn next_fire_after(trigger: &Trigger, fired_at: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, String> {
    match trigger {
        Trigger::Once { .. } => Ok(None),
        Trigger::Interval { interval_amount, interval_unit, .. } => {
            Ok(Some(advance_interval(fired_at, *interval_amount, *interval_unit)))
        }
        Trigger::Cron { expression } => next_cron_fire(expression, fired_at).map(Some),
    }
}

/// Compute the initial `next_fire_at` for a freshly scheduled event.
pub fn initial_fire_at(trigger: &Trigger, now: DateTime<Utc>) -> Result<DateTime<Utc>, String> {
    match trigger {
        Trigger::Once { next_execution } => Ok(*next_execution),
        Trigger::Interval { next_execution, .. } => Ok(*next_execution),
        Trigger::Cron { expression } => next_cron_fire(expression, now),
    }
}

/// Advance a past-due `next_fire_at` to the next fire strictly greater than
/// `recovery_time`, returning the new fire time and the number of intervals
/// skipped along the way (used by crash recovery to fast-forward an event
/// that missed fires while the process was down).
pub fn catch_up(trigger: &Trigger, next_fire_at: DateTime<Utc>, recovery_time: DateTime<Utc>) -> Result<(DateTime<Utc>, u64), String> {
    if next_fire_at > recovery_time {
        return Ok((next_fire_at, 0));
    }
    let mut current = next_fire_at;
    let mut skipped = 0u64;
    loop {
        let candidate = match trigger {
            Trigger::Once { .. } => return Ok((current, skipped)),
            Trigger::Interval { interval_amount, interval_unit, .. } => {
                advance_interval(current, *interval_amount, *interval_unit)
            }
            Trigger::Cron { expression } => next_cron_fire(expression, current)?,
        };
        skipped += 1;
        current = candidate;
        if current > recovery_time {
            return Ok((current, skipped));
        }
        if skipped > 100_000 {
            return Err("catch-up exceeded maximum interval count; trigger may be malformed".into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn month_interval_clamps_to_last_day() {
        let from = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
        let next = advance_interval(from, 1, IntervalUnit::Months);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap());
    }

    #[test]
    fn cron_scenario_s6() {
        let from = Utc.with_ymd_and_hms(2025, 1, 1, 2, 59, 0).unwrap();
        let next = next_cron_fire("0 3 * * *", from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 1, 1, 3, 0, 0).unwrap());
        let after = next_cron_fire("0 3 * * *", next).unwrap();
        assert_eq!(after, Utc.with_ymd_and_hms(2025, 1, 2, 3, 0, 0).unwrap());
    }

    #[test]
    fn catch_up_advances_past_recovery_time() {
        let trigger = Trigger::Interval {
            interval_amount: 1,
            interval_unit: IntervalUnit::Days,
            next_execution: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        };
        let stuck = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let recovery = Utc.with_ymd_and_hms(2025, 1, 1, 0, 5, 0).unwrap() + chrono::Duration::days(1);
        let (next, skipped) = catch_up(&trigger, stuck, recovery).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 1, 3, 0, 0, 0).unwrap());
        assert_eq!(skipped, 2);
    }
}
