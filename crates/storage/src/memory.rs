//! In-memory storage backend.
//!
//! Used for tests and for ephemeral runs; nothing survives the process.

use std::collections::HashMap;
use std::sync::Arc;
use async_trait::async_trait;
use taskwise_core::{
    EnrichmentField, ExecutionHistoryRecord, FieldModifications, NewSubtask, ProposalId,
    ProposalRecord, ProposalStatus, Task, TaskFilter, TaskId, TaskPatch, UserId,
};
use tokio::sync::Mutex;
use super::trait_::keyword_candidates;
use super::{HistoryStore, ProposalStore, Result, StorageError, TaskStore};

/// Map-backed storage for all three stores.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    tasks: Arc<Mutex<HashMap<TaskId, Task>>>,
    history: Arc<Mutex<Vec<ExecutionHistoryRecord>>>,
    proposals: Arc<Mutex<HashMap<ProposalId, ProposalRecord>>>,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of history records held.
    pub async fn history_len(&self) -> usize {
        self.history.lock().await.len()
    }
}

#[async_trait]
impl TaskStore for MemoryStorage {
    async fn find_completed_by_keyword(
        &self,
        user_id: &UserId,
        keywords: &[String],
        limit: usize,
    ) -> Result<Vec<Task>> {
        let tasks = self.tasks.lock().await;
        Ok(keyword_candidates(tasks.values().cloned(), user_id, keywords, limit))
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<Task>> {
        Ok(self.tasks.lock().await.get(&id).cloned())
    }

    async fn save_task(&self, task: &Task) -> Result<()> {
        self.tasks.lock().await.insert(task.id, task.clone());
        Ok(())
    }

    async fn insert_child(&self, parent_id: TaskId, subtask: NewSubtask) -> Result<Task> {
        let mut tasks = self.tasks.lock().await;
        let parent = tasks
            .get(&parent_id)
            .ok_or_else(|| StorageError::NotFound(format!("task {}", parent_id)))?;
        let child = subtask.into_task(parent);
        tasks.insert(child.id, child.clone());
        Ok(child)
    }

    async fn update_task(&self, id: TaskId, patch: &TaskPatch) -> Result<Task> {
        let mut tasks = self.tasks.lock().await;
        let task = tasks
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("task {}", id)))?;
        patch.apply_to(task);
        Ok(task.clone())
    }

    async fn list_children(&self, parent_id: TaskId) -> Result<Vec<Task>> {
        let tasks = self.tasks.lock().await;
        let mut children: Vec<Task> = tasks
            .values()
            .filter(|t| t.parent_task_id == Some(parent_id) && !t.is_deleted())
            .cloned()
            .collect();
        children.sort_by_key(|t| (t.metadata.sort_order, t.created_at));
        Ok(children)
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let tasks = self.tasks.lock().await;
        Ok(tasks.values().filter(|t| filter.matches(t)).cloned().collect())
    }
}

#[async_trait]
impl HistoryStore for MemoryStorage {
    async fn find_by_task_ids(
        &self,
        user_id: &UserId,
        task_ids: &[TaskId],
    ) -> Result<Vec<ExecutionHistoryRecord>> {
        let history = self.history.lock().await;
        Ok(history
            .iter()
            .filter(|r| &r.user_id == user_id && task_ids.contains(&r.task_id))
            .cloned()
            .collect())
    }

    async fn insert_history(&self, record: &ExecutionHistoryRecord) -> Result<()> {
        let mut history = self.history.lock().await;
        if history.iter().any(|r| r.task_id == record.task_id) {
            return Err(StorageError::Other(format!(
                "history for task {} already recorded",
                record.task_id
            )));
        }
        history.push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl ProposalStore for MemoryStorage {
    async fn insert_proposal(&self, record: &ProposalRecord) -> Result<ProposalId> {
        self.proposals.lock().await.insert(record.id, record.clone());
        Ok(record.id)
    }

    async fn get_proposal(&self, id: ProposalId) -> Result<Option<ProposalRecord>> {
        Ok(self.proposals.lock().await.get(&id).cloned())
    }

    async fn update_proposal_status(
        &self,
        id: ProposalId,
        status: ProposalStatus,
        accepted_fields: &[EnrichmentField],
        modifications: Option<&FieldModifications>,
    ) -> Result<()> {
        let mut proposals = self.proposals.lock().await;
        let record = proposals
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("proposal {}", id)))?;
        record.status = status;
        record.accepted_fields = accepted_fields.to_vec();
        record.modifications = modifications.cloned();
        record.updated_at = chrono::Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn completed(user: &str, title: &str, days_ago: i64) -> Task {
        let mut task = Task::new(UserId::new(user), title);
        task.complete(Utc::now() - Duration::days(days_ago));
        task
    }

    #[tokio::test]
    async fn test_keyword_search_scopes_and_orders() {
        let storage = MemoryStorage::new();
        let older = completed("u1", "Plan team offsite", 10);
        let newer = completed("u1", "Offsite retro", 1);
        let other_user = completed("u2", "Plan offsite", 1);
        let open = Task::new(UserId::new("u1"), "Offsite budget");
        let mut deleted = completed("u1", "Offsite venue", 2);
        deleted.deleted_at = Some(Utc::now());

        for t in [&older, &newer, &other_user, &open, &deleted] {
            storage.save_task(t).await.unwrap();
        }

        let found = storage
            .find_completed_by_keyword(&UserId::new("u1"), &["offsite".to_string()], 20)
            .await
            .unwrap();
        let ids: Vec<_> = found.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);

        let capped = storage
            .find_completed_by_keyword(&UserId::new("u1"), &["offsite".to_string()], 1)
            .await
            .unwrap();
        assert_eq!(capped.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_keywords_match_nothing() {
        let storage = MemoryStorage::new();
        storage.save_task(&completed("u1", "Anything", 1)).await.unwrap();
        let found = storage
            .find_completed_by_keyword(&UserId::new("u1"), &[], 20)
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_insert_child_requires_parent() {
        let storage = MemoryStorage::new();
        let subtask = NewSubtask {
            title: "Orphan".to_string(),
            estimated_minutes: None,
            metadata: Default::default(),
        };
        let err = storage.insert_child(TaskId::new(), subtask).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }
}
