//! Taskwise core data models.
//!
//! This crate defines the data structures shared by the task enrichment
//! and similarity matching engine.

#![warn(missing_docs)]

// Core identities
mod id;

// Task graph
mod task;

// Enrichment and learning loop
mod enrichment;
mod history;

// Scheduling
mod recurrence;

// Re-exports
pub use id::*;

pub use task::{
    NewSubtask, Priority, SubtaskType, Task, TaskFilter, TaskMetadata, TaskPatch, TaskSource,
    TaskStatus,
};
pub use enrichment::{
    AiCallMetadata, Confidence, EnrichmentField, EnrichmentInsights, EnrichmentProposal,
    FieldModifications, ProposalRecord, ProposalStatus, ProposedSubtask, SimilarityAnalysis,
    TaskDescriptor,
};
pub use history::{
    accuracy_ratio, AggregatedInsights, ExecutionHistoryRecord, ExecutionInsights, Outcome,
    SimilarTaskMatch, StallEvent,
};
pub use recurrence::{Frequency, RecurrenceRule};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;

/// A label that does not name any known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: '{value}'")]
pub struct ParseLabelError {
    kind: &'static str,
    value: String,
}

impl ParseLabelError {
    /// Error for `value` not being a valid `kind`.
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
