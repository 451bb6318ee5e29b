//! Next-occurrence calculation for recurring tasks.

use chrono::{Datelike, Days, Months, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use serde::Serialize;
use taskwise_core::{Frequency, RecurrenceRule, Time};

/// Result of advancing a recurrence by one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NextOccurrence {
    /// Next date at start of day, or the input date when complete
    pub next_date: Time,

    /// True when the series has ended
    pub is_complete: bool,

    /// 1-based number of `next_date` within the series
    pub occurrence_number: u32,
}

impl NextOccurrence {
    fn complete(from: Time, occurrence_count: u32) -> Self {
        Self {
            next_date: from,
            is_complete: true,
            occurrence_number: occurrence_count,
        }
    }
}

/// Compute the occurrence after `from`, given `occurrence_count` occurrences so far.
///
/// Returns `None` for a zero interval or when the date leaves chrono's range.
pub fn next_occurrence(rule: &RecurrenceRule, from: Time, occurrence_count: u32) -> Option<NextOccurrence> {
    if rule.count.is_some_and(|count| occurrence_count >= count) {
        return Some(NextOccurrence::complete(from, occurrence_count));
    }
    if rule.end_date.is_some_and(|end| from > end) {
        return Some(NextOccurrence::complete(from, occurrence_count));
    }
    if rule.interval == 0 {
        return None;
    }

    let date = from.date_naive();
    let next = match rule.frequency {
        Frequency::Daily => date.checked_add_days(Days::new(rule.interval as u64))?,
        Frequency::Weekly => next_weekly(date, rule.interval, &rule.days_of_week)?,
        Frequency::Monthly => next_monthly(date, rule)?,
        Frequency::Yearly => date.checked_add_months(Months::new(rule.interval.checked_mul(12)?))?,
    };
    let next_date = start_of_day(next);

    // The step can overshoot the end date
    if rule.end_date.is_some_and(|end| next_date > end) {
        return Some(NextOccurrence::complete(from, occurrence_count));
    }

    Some(NextOccurrence {
        next_date,
        is_complete: false,
        occurrence_number: occurrence_count + 1,
    })
}

/// Expand a rule into dates, starting with `start` itself.
///
/// Stops at `max` dates, at the rule's own termination, or past `until`.
pub fn generate_occurrences(
    rule: &RecurrenceRule,
    start: Time,
    max: usize,
    until: Option<Time>,
) -> Vec<Time> {
    if max == 0 {
        return Vec::new();
    }

    let mut dates = vec![start];
    let mut current = start;
    while dates.len() < max {
        let Some(next) = next_occurrence(rule, current, dates.len() as u32) else {
            break;
        };
        if next.is_complete || until.is_some_and(|u| next.next_date > u) {
            break;
        }
        dates.push(next.next_date);
        current = next.next_date;
    }
    dates
}

fn start_of_day(date: NaiveDate) -> Time {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// Sunday of the week containing `date`.
fn week_start(date: NaiveDate) -> NaiveDate {
    date - Days::new(date.weekday().num_days_from_sunday() as u64)
}

fn next_weekly(from: NaiveDate, interval: u32, days: &[Weekday]) -> Option<NaiveDate> {
    if days.is_empty() {
        return from.checked_add_days(Days::new(7 * interval as u64));
    }

    let origin_week = week_start(from);
    let target_week = origin_week.checked_add_days(Days::new(7 * interval as u64))?;
    let mut candidate = from.succ_opt()?;

    // One week to leave the origin week plus one to scan the target week
    for _ in 0..14 {
        if interval > 1 && week_start(candidate) != origin_week && candidate < target_week {
            candidate = target_week;
        }
        if days.contains(&candidate.weekday()) {
            return Some(candidate);
        }
        candidate = candidate.succ_opt()?;
    }
    None
}

fn next_monthly(from: NaiveDate, rule: &RecurrenceRule) -> Option<NaiveDate> {
    let advanced = from.with_day(1)?.checked_add_months(Months::new(rule.interval))?;

    if let (Some(nth), Some(weekday)) = (rule.week_of_month, rule.day_of_week_in_month) {
        return nth_weekday(advanced.year(), advanced.month(), nth, weekday);
    }

    let day = rule.day_of_month.unwrap_or(from.day());
    let last = days_in_month(advanced.year(), advanced.month())?;
    advanced.with_day(day.clamp(1, last))
}

/// The nth `weekday` of a month, or its last one when the month has fewer.
fn nth_weekday(year: i32, month: u32, nth: u32, weekday: Weekday) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, nth.clamp(1, 5) as u8).or_else(|| {
        NaiveDate::from_weekday_of_month_opt(year, month, weekday, 4)
    })
}

fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = first.checked_add_months(Months::new(1))?;
    Some(next.signed_duration_since(first).num_days() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32) -> Time {
        Utc.with_ymd_and_hms(y, m, d, 9, 30, 0).unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> Time {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_count_reached_is_complete_regardless_of_date() {
        let rule = RecurrenceRule::new(Frequency::Daily).times(3);
        let from = at(2026, 3, 10);
        let next = next_occurrence(&rule, from, 3).unwrap();
        assert!(next.is_complete);
        assert_eq!(next.next_date, from);
    }

    #[test]
    fn test_daily_truncates_to_start_of_day() {
        let rule = RecurrenceRule::new(Frequency::Daily).every(2);
        let next = next_occurrence(&rule, at(2026, 3, 10), 0).unwrap();
        assert_eq!(next.next_date, day(2026, 3, 12));
        assert_eq!(next.occurrence_number, 1);
        assert!(!next.is_complete);
    }

    #[test]
    fn test_weekly_without_days_adds_weeks() {
        let rule = RecurrenceRule::new(Frequency::Weekly).every(2);
        let next = next_occurrence(&rule, at(2026, 3, 10), 0).unwrap();
        assert_eq!(next.next_date, day(2026, 3, 24));
    }

    #[test]
    fn test_weekly_days_within_same_week() {
        // 2026-03-10 is a Tuesday
        let rule = RecurrenceRule::new(Frequency::Weekly)
            .every(2)
            .on_days([Weekday::Tue, Weekday::Thu]);
        let next = next_occurrence(&rule, at(2026, 3, 10), 0).unwrap();
        assert_eq!(next.next_date, day(2026, 3, 12));
    }

    #[test]
    fn test_weekly_interval_boundary_crossing() {
        // Thursday 2026-03-12; the week starts Sunday 2026-03-08
        let rule = RecurrenceRule::new(Frequency::Weekly)
            .every(2)
            .on_days([Weekday::Tue, Weekday::Thu]);
        let next = next_occurrence(&rule, at(2026, 3, 12), 1).unwrap();
        // Skips the week of 03-15 and lands on Tuesday of the week of 03-22
        assert_eq!(next.next_date, day(2026, 3, 24));
    }

    #[test]
    fn test_weekly_boundary_on_saturday_with_sunday_rule() {
        // Saturday 2026-03-14; Sunday 03-15 opens a new week
        let rule = RecurrenceRule::new(Frequency::Weekly)
            .every(3)
            .on_days([Weekday::Sun]);
        let next = next_occurrence(&rule, at(2026, 3, 14), 0).unwrap();
        assert_eq!(next.next_date, day(2026, 3, 29));
    }

    #[test]
    fn test_weekly_interval_one_takes_next_matching_day() {
        let rule = RecurrenceRule::new(Frequency::Weekly).on_days([Weekday::Mon]);
        let next = next_occurrence(&rule, at(2026, 3, 12), 0).unwrap();
        assert_eq!(next.next_date, day(2026, 3, 16));
    }

    #[test]
    fn test_monthly_day_of_month_clamps() {
        let rule = RecurrenceRule::new(Frequency::Monthly).on_day_of_month(31);
        let next = next_occurrence(&rule, at(2026, 1, 31), 0).unwrap();
        assert_eq!(next.next_date, day(2026, 2, 28));

        let next = next_occurrence(&rule, next.next_date, 1).unwrap();
        assert_eq!(next.next_date, day(2026, 3, 31));
    }

    #[test]
    fn test_monthly_same_day_by_default() {
        let rule = RecurrenceRule::new(Frequency::Monthly).every(3);
        let next = next_occurrence(&rule, at(2026, 11, 15), 0).unwrap();
        assert_eq!(next.next_date, day(2027, 2, 15));
    }

    #[test]
    fn test_monthly_nth_weekday() {
        // Second Tuesday of April 2026 is the 14th
        let rule = RecurrenceRule::new(Frequency::Monthly).on_nth_weekday(2, Weekday::Tue);
        let next = next_occurrence(&rule, at(2026, 3, 10), 0).unwrap();
        assert_eq!(next.next_date, day(2026, 4, 14));
    }

    #[test]
    fn test_monthly_fifth_weekday_falls_back_to_last() {
        // February 2026 has four Mondays; the last is the 23rd
        let rule = RecurrenceRule::new(Frequency::Monthly).on_nth_weekday(5, Weekday::Mon);
        let next = next_occurrence(&rule, at(2026, 1, 26), 0).unwrap();
        assert_eq!(next.next_date, day(2026, 2, 23));
    }

    #[test]
    fn test_yearly_leap_day() {
        let rule = RecurrenceRule::new(Frequency::Yearly);
        let next = next_occurrence(&rule, at(2028, 2, 29), 0).unwrap();
        assert_eq!(next.next_date, day(2029, 2, 28));
    }

    #[test]
    fn test_end_date_checked_before_and_after_step() {
        let rule = RecurrenceRule::new(Frequency::Weekly).until(day(2026, 3, 15));
        let from = at(2026, 3, 10);
        let next = next_occurrence(&rule, from, 0).unwrap();
        assert!(next.is_complete);
        assert_eq!(next.next_date, from);

        let past_end = next_occurrence(&rule, at(2026, 3, 16), 0).unwrap();
        assert!(past_end.is_complete);
    }

    #[test]
    fn test_zero_interval_is_none() {
        let rule = RecurrenceRule::new(Frequency::Daily).every(0);
        assert!(next_occurrence(&rule, at(2026, 3, 10), 0).is_none());
    }

    #[test]
    fn test_generate_seeds_with_start_and_honors_count() {
        let rule = RecurrenceRule::new(Frequency::Daily).times(3);
        let start = at(2026, 3, 10);
        let dates = generate_occurrences(&rule, start, 10, None);
        assert_eq!(dates, vec![start, day(2026, 3, 11), day(2026, 3, 12)]);
    }

    #[test]
    fn test_generate_stops_at_cap_and_until() {
        let rule = RecurrenceRule::new(Frequency::Daily);
        let start = at(2026, 3, 10);
        assert_eq!(generate_occurrences(&rule, start, 4, None).len(), 4);

        let dates = generate_occurrences(&rule, start, 10, Some(day(2026, 3, 12)));
        assert_eq!(dates.last(), Some(&day(2026, 3, 12)));
        assert_eq!(dates.len(), 3);

        assert!(generate_occurrences(&rule, start, 0, None).is_empty());
    }
}
