//! Storage trait abstractions.
//!
//! The enrichment engine talks to three narrow stores. A backend may
//! implement all of them on one type.

use async_trait::async_trait;
use taskwise_core::{
    ExecutionHistoryRecord, NewSubtask, ProposalId, ProposalRecord, ProposalStatus, Task,
    TaskFilter, TaskId, TaskPatch, UserId, EnrichmentField, FieldModifications,
};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Task graph storage.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Completed, non-deleted tasks of `user_id` whose title or description
    /// contains any keyword (case-insensitive), newest completion first.
    ///
    /// An empty keyword list matches nothing.
    async fn find_completed_by_keyword(
        &self,
        user_id: &UserId,
        keywords: &[String],
        limit: usize,
    ) -> Result<Vec<Task>>;

    /// Load a task by ID regardless of owner; callers check ownership.
    async fn get_task(&self, id: TaskId) -> Result<Option<Task>>;

    /// Create or replace a task.
    async fn save_task(&self, task: &Task) -> Result<()>;

    /// Insert a child task under `parent_id`.
    async fn insert_child(&self, parent_id: TaskId, subtask: NewSubtask) -> Result<Task>;

    /// Apply a partial update and return the updated task.
    async fn update_task(&self, id: TaskId, patch: &TaskPatch) -> Result<Task>;

    /// Direct, non-deleted children of a task.
    async fn list_children(&self, parent_id: TaskId) -> Result<Vec<Task>>;

    /// List tasks matching the filter.
    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>>;
}

/// Append-only execution history storage.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Records of `user_id` for any of the given tasks.
    async fn find_by_task_ids(
        &self,
        user_id: &UserId,
        task_ids: &[TaskId],
    ) -> Result<Vec<ExecutionHistoryRecord>>;

    /// Append a record.
    async fn insert_history(&self, record: &ExecutionHistoryRecord) -> Result<()>;
}

/// Durable proposal storage.
#[async_trait]
pub trait ProposalStore: Send + Sync {
    /// Persist a proposal record and return its ID.
    async fn insert_proposal(&self, record: &ProposalRecord) -> Result<ProposalId>;

    /// Load a proposal by ID regardless of owner; callers check ownership.
    async fn get_proposal(&self, id: ProposalId) -> Result<Option<ProposalRecord>>;

    /// Record the review outcome. Last write wins.
    async fn update_proposal_status(
        &self,
        id: ProposalId,
        status: ProposalStatus,
        accepted_fields: &[EnrichmentField],
        modifications: Option<&FieldModifications>,
    ) -> Result<()>;
}

/// Shared keyword query used by the backends.
pub(crate) fn keyword_candidates(
    tasks: impl Iterator<Item = Task>,
    user_id: &UserId,
    keywords: &[String],
    limit: usize,
) -> Vec<Task> {
    if keywords.is_empty() {
        return Vec::new();
    }

    let mut matched: Vec<Task> = tasks
        .filter(|t| t.is_owned_by(user_id) && t.is_completed() && !t.is_deleted())
        .filter(|t| keywords.iter().any(|k| t.mentions(k)))
        .collect();

    // Newest completion first; tasks without a timestamp sort last
    matched.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
    matched.truncate(limit);
    matched
}
