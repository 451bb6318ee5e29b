//! Date arithmetic for tasks.
//!
//! Recurrence expansion and due-date suggestion. Pure functions, no I/O.

#![warn(missing_docs)]

pub mod due_date;
pub mod recurrence;

pub use due_date::{buffer_days, suggest_due_date, PRODUCTIVE_MINUTES_PER_DAY};
pub use recurrence::{generate_occurrences, next_occurrence, NextOccurrence};
