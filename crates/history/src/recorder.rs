//! Execution history recorder.

use std::sync::Arc;
use chrono::Utc;
use taskwise_core::{
    accuracy_ratio, ExecutionHistoryRecord, HistoryRecordId, Outcome, Task, TaskId, Time, UserId,
};
use taskwise_similarity::extract_keywords;
use taskwise_storage::{HistoryStore, StorageError, TaskStore};
use tracing::{debug, info};

/// Result type for history operations.
pub type Result<T> = std::result::Result<T, HistoryError>;

/// History recording errors.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// Task missing or not in the completed state
    #[error("Completed task not found: {0}")]
    CompletedTaskNotFound(TaskId),

    /// Task belongs to another user
    #[error("Task {0} is not accessible to this user")]
    Unauthorized(TaskId),

    /// Storage failure
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl HistoryError {
    /// Whether the task could not be found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, HistoryError::CompletedTaskNotFound(_))
    }

    /// Whether access should be denied; unauthorized reads as not found.
    pub fn is_denied(&self) -> bool {
        matches!(
            self,
            HistoryError::CompletedTaskNotFound(_) | HistoryError::Unauthorized(_)
        )
    }
}

/// Records one history entry per completed task.
#[derive(Clone)]
pub struct HistoryRecorder {
    tasks: Arc<dyn TaskStore>,
    history: Arc<dyn HistoryStore>,
}

impl HistoryRecorder {
    /// Create a new recorder.
    pub fn new(tasks: Arc<dyn TaskStore>, history: Arc<dyn HistoryStore>) -> Self {
        Self { tasks, history }
    }

    /// Record how a completed task went.
    ///
    /// Calling it again for the same task returns the existing record.
    pub async fn record(&self, user_id: &UserId, task_id: TaskId) -> Result<ExecutionHistoryRecord> {
        let task = self
            .tasks
            .get_task(task_id)
            .await?
            .filter(|t| !t.is_deleted())
            .ok_or(HistoryError::CompletedTaskNotFound(task_id))?;
        if !task.is_owned_by(user_id) {
            return Err(HistoryError::Unauthorized(task_id));
        }
        if !task.is_completed() {
            return Err(HistoryError::CompletedTaskNotFound(task_id));
        }

        if let Some(existing) = self
            .history
            .find_by_task_ids(user_id, &[task_id])
            .await?
            .into_iter()
            .next()
        {
            debug!("History for task {} already recorded", task_id);
            return Ok(existing);
        }

        let children = self.tasks.list_children(task_id).await?;
        let record = build_record(&task, &children);
        self.history.insert_history(&record).await?;

        info!(
            "Recorded history for task {}: outcome {}, ratio {:?}, {} subtasks added",
            task_id, record.outcome, record.accuracy_ratio, record.added_subtask_count
        );
        Ok(record)
    }
}

fn build_record(task: &Task, children: &[Task]) -> ExecutionHistoryRecord {
    let completed_at = task.completed_at.unwrap_or(task.updated_at);
    let days_overdue = task
        .due_date
        .map(|due| days_overdue(due, completed_at))
        .unwrap_or(0);

    let (original, added): (Vec<&Task>, Vec<&Task>) =
        children.iter().partition(|c| c.metadata.is_ai_suggested());

    ExecutionHistoryRecord {
        id: HistoryRecordId::new(),
        task_id: task.id,
        user_id: task.user_id.clone(),
        title: task.title.clone(),
        estimated_minutes: task.estimated_minutes,
        actual_minutes: task.actual_minutes,
        accuracy_ratio: accuracy_ratio(task.estimated_minutes, task.actual_minutes),
        original_subtask_count: original.len() as u32,
        added_subtask_count: added.len() as u32,
        original_subtasks: original.iter().map(|t| t.title.clone()).collect(),
        added_subtasks: added.iter().map(|t| t.title.clone()).collect(),
        stall_events: task.metadata.stall_events.clone(),
        outcome: if days_overdue > 0 {
            Outcome::CompletedLate
        } else {
            Outcome::Completed
        },
        completed_at,
        days_overdue,
        keyword_fingerprint: extract_keywords(&task.text()),
        created_at: Utc::now(),
    }
}

/// Whole days past the due date; early completion counts as zero.
fn days_overdue(due: Time, completed_at: Time) -> u32 {
    (completed_at - due).num_days().max(0) as u32
}
