//! Recurrence rule model.

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use crate::Time;

/// How often a task repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    /// Every `interval` days
    Daily,
    /// Every `interval` weeks
    Weekly,
    /// Every `interval` months
    Monthly,
    /// Every `interval` years
    Yearly,
}

/// A recurrence rule.
///
/// When both `end_date` and `count` are set, whichever triggers first ends
/// the series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    /// Base frequency
    pub frequency: Frequency,

    /// Step between occurrences (positive)
    #[serde(default = "default_interval")]
    pub interval: u32,

    /// Weekly: allowed days
    #[serde(default)]
    pub days_of_week: Vec<Weekday>,

    /// Monthly: fixed day of month, clamped to the month length
    #[serde(default)]
    pub day_of_month: Option<u32>,

    /// Monthly: nth week (1-based) for "nth weekday" rules
    #[serde(default)]
    pub week_of_month: Option<u32>,

    /// Monthly: weekday for "nth weekday" rules
    #[serde(default)]
    pub day_of_week_in_month: Option<Weekday>,

    /// Last allowed date
    #[serde(default)]
    pub end_date: Option<Time>,

    /// Maximum number of occurrences
    #[serde(default)]
    pub count: Option<u32>,
}

fn default_interval() -> u32 {
    1
}

impl RecurrenceRule {
    /// Rule with the given frequency and interval 1.
    pub fn new(frequency: Frequency) -> Self {
        Self {
            frequency,
            interval: 1,
            days_of_week: Vec::new(),
            day_of_month: None,
            week_of_month: None,
            day_of_week_in_month: None,
            end_date: None,
            count: None,
        }
    }

    /// Set the interval.
    pub fn every(mut self, interval: u32) -> Self {
        self.interval = interval;
        self
    }

    /// Restrict weekly rules to these days.
    pub fn on_days(mut self, days: impl IntoIterator<Item = Weekday>) -> Self {
        self.days_of_week = days.into_iter().collect();
        self
    }

    /// Monthly rule on a fixed day of month.
    pub fn on_day_of_month(mut self, day: u32) -> Self {
        self.day_of_month = Some(day);
        self
    }

    /// Monthly rule on the nth weekday, e.g. the 2nd Tuesday.
    pub fn on_nth_weekday(mut self, nth: u32, weekday: Weekday) -> Self {
        self.week_of_month = Some(nth);
        self.day_of_week_in_month = Some(weekday);
        self
    }

    /// End the series after a date.
    pub fn until(mut self, end_date: Time) -> Self {
        self.end_date = Some(end_date);
        self
    }

    /// End the series after a number of occurrences.
    pub fn times(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_deserializes_with_defaults() {
        let rule: RecurrenceRule =
            serde_json::from_str(r#"{"frequency":"weekly","days_of_week":["Mon","Thu"]}"#).unwrap();
        assert_eq!(rule.interval, 1);
        assert_eq!(rule.days_of_week, vec![Weekday::Mon, Weekday::Thu]);
        assert!(rule.count.is_none());
    }
}
