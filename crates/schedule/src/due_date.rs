//! Deterministic due-date suggestion.

use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, TimeZone, Weekday};
use taskwise_core::Priority;

/// Productive minutes assumed per working day.
pub const PRODUCTIVE_MINUTES_PER_DAY: u32 = 240;

/// Hour of day the suggested due date is set to.
pub const DUE_HOUR: u32 = 17;

/// Extra business days of slack per priority.
pub fn buffer_days(priority: Priority) -> u32 {
    match priority {
        Priority::High => 1,
        Priority::Medium => 2,
        Priority::Low => 3,
        Priority::None => 2,
    }
}

/// Suggest a due date for `estimated_minutes` of work starting at `now`.
///
/// Working days are `ceil(minutes / 240)` plus the priority buffer, counted
/// in business days (weekends skipped), landing at 17:00 in `now`'s zone.
pub fn suggest_due_date<Tz: TimeZone>(
    estimated_minutes: u32,
    priority: Priority,
    now: DateTime<Tz>,
) -> DateTime<Tz> {
    let working_days = estimated_minutes.div_ceil(PRODUCTIVE_MINUTES_PER_DAY);
    let total = working_days + buffer_days(priority);

    let local = now.naive_local().date();
    let target = add_business_days(local, total);

    target
        .and_hms_opt(DUE_HOUR, 0, 0)
        .and_then(|naive| now.timezone().from_local_datetime(&naive).earliest())
        .unwrap_or_else(|| now + Duration::days(total as i64))
}

fn add_business_days(from: NaiveDate, days: u32) -> NaiveDate {
    let mut date = from;
    let mut remaining = days;
    while remaining > 0 {
        let Some(next) = date.checked_add_days(Days::new(1)) else {
            break;
        };
        date = next;
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            remaining -= 1;
        }
    }
    date
}
