//! Execution history.
//!
//! Turns a completed task into an immutable record of how it actually went,
//! which later similarity searches read back as insight.

#![warn(missing_docs)]

pub mod recorder;

pub use recorder::{HistoryError, HistoryRecorder, Result};
