//! Candidate retrieval - keyword phase of the two-phase similarity search.

use std::collections::HashMap;
use std::sync::Arc;
use taskwise_core::{ExecutionHistoryRecord, Task, UserId};
use taskwise_storage::{HistoryStore, Result, TaskStore};
use tracing::debug;

/// Default candidate cap.
pub const DEFAULT_CANDIDATE_LIMIT: usize = 20;

/// A completed task that shares at least one keyword with the query.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// The completed task
    pub task: Task,

    /// Its execution history, if one was recorded
    pub history: Option<ExecutionHistoryRecord>,
}

/// Finds completed tasks by keyword and joins their history.
#[derive(Clone)]
pub struct CandidateRetriever {
    tasks: Arc<dyn TaskStore>,
    history: Arc<dyn HistoryStore>,
}

impl CandidateRetriever {
    /// Create a new retriever.
    pub fn new(tasks: Arc<dyn TaskStore>, history: Arc<dyn HistoryStore>) -> Self {
        Self { tasks, history }
    }

    /// Completed tasks of `user_id` mentioning any keyword, newest first.
    ///
    /// An empty keyword list returns no candidates.
    pub async fn retrieve(
        &self,
        user_id: &UserId,
        keywords: &[String],
        limit: usize,
    ) -> Result<Vec<Candidate>> {
        if keywords.is_empty() {
            debug!("No keywords, skipping candidate retrieval");
            return Ok(Vec::new());
        }

        let tasks = self
            .tasks
            .find_completed_by_keyword(user_id, keywords, limit)
            .await?;
        if tasks.is_empty() {
            return Ok(Vec::new());
        }

        // Separate lookup so the task store needs no join support
        let ids: Vec<_> = tasks.iter().map(|t| t.id).collect();
        let mut by_task: HashMap<_, _> = self
            .history
            .find_by_task_ids(user_id, &ids)
            .await?
            .into_iter()
            .map(|r| (r.task_id, r))
            .collect();

        debug!(
            "Retrieved {} candidates ({} with history) for {:?}",
            tasks.len(),
            by_task.len(),
            keywords
        );

        Ok(tasks
            .into_iter()
            .map(|task| Candidate {
                history: by_task.remove(&task.id),
                task,
            })
            .collect())
    }
}
