//! Execution history - what actually happened when a task was done.

use serde::{Deserialize, Serialize};
use crate::id::{HistoryRecordId, TaskId, UserId};
use crate::{ParseLabelError, Time};

/// Immutable record written once when a task completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionHistoryRecord {
    /// Unique identifier
    pub id: HistoryRecordId,

    /// Completed task
    pub task_id: TaskId,

    /// Owning user
    pub user_id: UserId,

    /// Task title at completion time
    pub title: String,

    /// Estimate in minutes
    pub estimated_minutes: Option<u32>,

    /// Actual duration in minutes
    pub actual_minutes: Option<u32>,

    /// `actual / estimate`, present only when both are known
    pub accuracy_ratio: Option<f64>,

    /// Subtasks that came from the accepted AI plan
    pub original_subtask_count: u32,

    /// Subtasks added during execution
    pub added_subtask_count: u32,

    /// Titles of the planned subtasks
    pub original_subtasks: Vec<String>,

    /// Titles of subtasks added during execution
    pub added_subtasks: Vec<String>,

    /// Periods without progress
    pub stall_events: Vec<StallEvent>,

    /// How the task ended
    pub outcome: Outcome,

    /// Completion timestamp
    pub completed_at: Time,

    /// Whole days past the due date
    pub days_overdue: u32,

    /// Top keywords of title and description at completion time
    pub keyword_fingerprint: Vec<String>,

    /// Record creation timestamp
    pub created_at: Time,
}

impl ExecutionHistoryRecord {
    /// Snapshot used when the task shows up as a similar match.
    pub fn insights(&self) -> ExecutionInsights {
        ExecutionInsights {
            estimated_vs_actual: self.accuracy_ratio,
            subtasks_added: self.added_subtask_count,
            added_subtasks: self.added_subtasks.clone(),
            stall_points: self.stall_events.iter().filter_map(StallEvent::describe).collect(),
            outcome: Some(self.outcome),
        }
    }
}

/// Accuracy ratio, refusing to fabricate values from missing or zero inputs.
pub fn accuracy_ratio(estimated_minutes: Option<u32>, actual_minutes: Option<u32>) -> Option<f64> {
    match (estimated_minutes, actual_minutes) {
        (Some(estimate), Some(actual)) if estimate > 0 => Some(actual as f64 / estimate as f64),
        _ => None,
    }
}

/// How a task ended.
///
/// Only `Completed` and `CompletedLate` are assigned automatically; the other
/// variants are set by flows outside the recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Done on time
    Completed,
    /// Done after the due date
    CompletedLate,
    /// Given up
    Abandoned,
    /// Handed to someone else
    Delegated,
    /// Pushed out
    Deferred,
}

impl Outcome {
    /// Label used in prompts and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::CompletedLate => "completed_late",
            Outcome::Abandoned => "abandoned",
            Outcome::Delegated => "delegated",
            Outcome::Deferred => "deferred",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Outcome {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "completed" => Ok(Outcome::Completed),
            "completed_late" => Ok(Outcome::CompletedLate),
            "abandoned" => Ok(Outcome::Abandoned),
            "delegated" => Ok(Outcome::Delegated),
            "deferred" => Ok(Outcome::Deferred),
            _ => Err(ParseLabelError::new("outcome", s)),
        }
    }
}

/// A period during execution where nothing moved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StallEvent {
    /// Start of the stall
    pub started_at: Time,

    /// End of the stall, if it ended
    #[serde(default)]
    pub ended_at: Option<Time>,

    /// Why it stalled
    #[serde(default)]
    pub reason: Option<String>,
}

impl StallEvent {
    /// Stall point used for aggregation; `None` when no reason was given.
    pub fn describe(&self) -> Option<String> {
        self.reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
    }
}

/// Execution snapshot attached to a similar task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionInsights {
    /// Accuracy ratio of the past task
    pub estimated_vs_actual: Option<f64>,

    /// Number of subtasks added mid-execution
    pub subtasks_added: u32,

    /// Titles of subtasks added mid-execution
    pub added_subtasks: Vec<String>,

    /// Stall point descriptions
    pub stall_points: Vec<String>,

    /// Outcome, if history exists
    pub outcome: Option<Outcome>,
}

/// One retrieval result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarTaskMatch {
    /// Candidate task
    pub task_id: TaskId,

    /// Candidate title
    pub title: String,

    /// Similarity score, 0-100
    pub score: u8,

    /// Why the candidate matched
    pub reasons: Vec<String>,

    /// What happened when the candidate was executed
    pub insights: ExecutionInsights,
}

/// Population-level statistics over similar tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedInsights {
    /// Mean accuracy ratio; 1.0 when unknown
    pub avg_estimation_accuracy: f64,

    /// Stall points seen in more than one match
    pub common_stall_points: Vec<String>,

    /// Added subtasks seen in more than one match
    pub common_subtasks_added: Vec<String>,

    /// Percentage of matches that ended `completed`
    pub success_rate: u8,
}

impl Default for AggregatedInsights {
    fn default() -> Self {
        Self {
            avg_estimation_accuracy: 1.0,
            common_stall_points: Vec::new(),
            common_subtasks_added: Vec::new(),
            success_rate: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accuracy_ratio_never_fabricated() {
        assert_eq!(accuracy_ratio(Some(120), Some(180)), Some(1.5));
        assert_eq!(accuracy_ratio(None, Some(180)), None);
        assert_eq!(accuracy_ratio(Some(120), None), None);
        assert_eq!(accuracy_ratio(Some(0), Some(30)), None);
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(Outcome::CompletedLate.to_string(), "completed_late");
        assert_eq!("deferred".parse::<Outcome>().unwrap(), Outcome::Deferred);
        let json = serde_json::to_string(&Outcome::CompletedLate).unwrap();
        assert_eq!(json, "\"completed_late\"");
    }

    #[test]
    fn test_reasonless_stalls_are_not_stall_points() {
        let stall = StallEvent {
            started_at: chrono::Utc::now(),
            ended_at: None,
            reason: Some("  waiting on vendor ".to_string()),
        };
        assert_eq!(stall.describe().as_deref(), Some("waiting on vendor"));
        let silent = StallEvent { reason: None, ..stall.clone() };
        assert_eq!(silent.describe(), None);
        let blank = StallEvent { reason: Some("  ".to_string()), ..stall.clone() };

        let record = ExecutionHistoryRecord {
            id: crate::HistoryRecordId::new(),
            task_id: crate::TaskId::new(),
            user_id: crate::UserId::new("u1"),
            title: "Ship order".to_string(),
            estimated_minutes: None,
            actual_minutes: None,
            accuracy_ratio: None,
            original_subtask_count: 0,
            added_subtask_count: 0,
            original_subtasks: vec![],
            added_subtasks: vec![],
            stall_events: vec![silent.clone(), stall, blank, silent],
            outcome: Outcome::Completed,
            completed_at: chrono::Utc::now(),
            days_overdue: 0,
            keyword_fingerprint: vec![],
            created_at: chrono::Utc::now(),
        };
        assert_eq!(record.insights().stall_points, vec!["waiting on vendor".to_string()]);
    }
}
