//! JSON file storage implementation.
//!
//! Stores data as JSON files under a root directory and keeps small
//! per-object meta markers (version + updated_at).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use async_trait::async_trait;
use taskwise_core::{
    EnrichmentField, ExecutionHistoryRecord, FieldModifications, NewSubtask, ProposalId,
    ProposalRecord, ProposalStatus, Task, TaskFilter, TaskId, TaskPatch, UserId,
};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;
use super::trait_::keyword_candidates;
use super::{HistoryStore, ProposalStore, Result, StorageError, TaskStore};

/// File-based JSON storage backend.
pub struct JsonStorage {
    root: PathBuf,
    // Serializes read-modify-write cycles on individual files.
    write_lock: Arc<Mutex<()>>,
}

impl JsonStorage {
    /// Create storage, creating the data and meta subdirectories.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        for kind in ["tasks", "history", "proposals"] {
            fs::create_dir_all(root.join(kind)).await?;
            fs::create_dir_all(root.join("meta").join(kind)).await?;
        }

        Ok(Self {
            root,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn task_path(&self, id: TaskId) -> PathBuf {
        self.root.join("tasks").join(format!("{}.json", id))
    }
    fn history_path(&self, task_id: TaskId) -> PathBuf {
        self.root.join("history").join(format!("{}.json", task_id))
    }
    fn proposal_path(&self, id: ProposalId) -> PathBuf {
        self.root.join("proposals").join(format!("{}.json", id))
    }

    fn meta_path(&self, kind: &str, id: &str) -> PathBuf {
        self.root.join("meta").join(kind).join(format!("{}.meta.json", id))
    }

    /// Read and increment per-object version, return new version.
    async fn bump_version(&self, kind: &str, id: &str) -> Result<u64> {
        let path = self.meta_path(kind, id);
        let mut version = 0u64;
        if let Ok(s) = fs::read_to_string(&path).await {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(&s) {
                if let Some(v) = json.get("version").and_then(|v| v.as_u64()) {
                    version = v;
                }
            }
        }
        version += 1;
        let meta = serde_json::json!({"version": version, "updated_at": chrono::Utc::now()});
        fs::write(&path, serde_json::to_string_pretty(&meta)?.as_bytes()).await?;
        Ok(version)
    }

    async fn write_task(&self, task: &Task) -> Result<()> {
        write_json(&self.task_path(task.id), task).await?;
        let version = self.bump_version("tasks", &task.id.to_string()).await?;
        debug!("Wrote task {} (v{})", task.id, version);
        Ok(())
    }
}

#[async_trait]
impl TaskStore for JsonStorage {
    async fn find_completed_by_keyword(
        &self,
        user_id: &UserId,
        keywords: &[String],
        limit: usize,
    ) -> Result<Vec<Task>> {
        if keywords.is_empty() {
            return Ok(Vec::new());
        }
        let all: Vec<Task> = list_dir(&self.root.join("tasks")).await?;
        Ok(keyword_candidates(all.into_iter(), user_id, keywords, limit))
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<Task>> {
        read_json(&self.task_path(id)).await
    }

    async fn save_task(&self, task: &Task) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_task(task).await
    }

    async fn insert_child(&self, parent_id: TaskId, subtask: NewSubtask) -> Result<Task> {
        let _guard = self.write_lock.lock().await;
        let parent: Task = read_json(&self.task_path(parent_id))
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("task {}", parent_id)))?;
        let child = subtask.into_task(&parent);
        self.write_task(&child).await?;
        Ok(child)
    }

    async fn update_task(&self, id: TaskId, patch: &TaskPatch) -> Result<Task> {
        let _guard = self.write_lock.lock().await;
        let mut task: Task = read_json(&self.task_path(id))
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("task {}", id)))?;
        patch.apply_to(&mut task);
        self.write_task(&task).await?;
        Ok(task)
    }

    async fn list_children(&self, parent_id: TaskId) -> Result<Vec<Task>> {
        let all: Vec<Task> = list_dir(&self.root.join("tasks")).await?;
        let mut children: Vec<Task> = all
            .into_iter()
            .filter(|t| t.parent_task_id == Some(parent_id) && !t.is_deleted())
            .collect();
        children.sort_by_key(|t| (t.metadata.sort_order, t.created_at));
        Ok(children)
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let all: Vec<Task> = list_dir(&self.root.join("tasks")).await?;
        Ok(all.into_iter().filter(|t| filter.matches(t)).collect())
    }
}

#[async_trait]
impl HistoryStore for JsonStorage {
    async fn find_by_task_ids(
        &self,
        user_id: &UserId,
        task_ids: &[TaskId],
    ) -> Result<Vec<ExecutionHistoryRecord>> {
        let mut records = Vec::new();
        for &task_id in task_ids {
            let record: Option<ExecutionHistoryRecord> =
                read_json(&self.history_path(task_id)).await?;
            if let Some(record) = record.filter(|r| &r.user_id == user_id) {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn insert_history(&self, record: &ExecutionHistoryRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.history_path(record.task_id);
        if fs::try_exists(&path).await? {
            return Err(StorageError::Other(format!(
                "history for task {} already recorded",
                record.task_id
            )));
        }
        write_json(&path, record).await
    }
}

#[async_trait]
impl ProposalStore for JsonStorage {
    async fn insert_proposal(&self, record: &ProposalRecord) -> Result<ProposalId> {
        let _guard = self.write_lock.lock().await;
        write_json(&self.proposal_path(record.id), record).await?;
        self.bump_version("proposals", &record.id.to_string()).await?;
        Ok(record.id)
    }

    async fn get_proposal(&self, id: ProposalId) -> Result<Option<ProposalRecord>> {
        read_json(&self.proposal_path(id)).await
    }

    async fn update_proposal_status(
        &self,
        id: ProposalId,
        status: ProposalStatus,
        accepted_fields: &[EnrichmentField],
        modifications: Option<&FieldModifications>,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.proposal_path(id);
        let mut record: ProposalRecord = read_json(&path)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("proposal {}", id)))?;
        record.status = status;
        record.accepted_fields = accepted_fields.to_vec();
        record.modifications = modifications.cloned();
        record.updated_at = chrono::Utc::now();
        write_json(&path, &record).await?;
        self.bump_version("proposals", &id.to_string()).await?;
        Ok(())
    }
}

async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json.as_bytes()).await?;
    Ok(())
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn list_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        if entry.path().extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        if let Ok(Some(item)) = read_json(&entry.path()).await {
            items.push(item);
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use taskwise_core::{
        AiCallMetadata, EnrichmentProposal, HistoryRecordId, Outcome, TaskStatus,
    };

    fn completed(user: &str, title: &str, days_ago: i64) -> Task {
        let mut task = Task::new(UserId::new(user), title);
        task.complete(Utc::now() - Duration::days(days_ago));
        task
    }

    fn history(task: &Task) -> ExecutionHistoryRecord {
        ExecutionHistoryRecord {
            id: HistoryRecordId::new(),
            task_id: task.id,
            user_id: task.user_id.clone(),
            title: task.title.clone(),
            estimated_minutes: Some(60),
            actual_minutes: Some(90),
            accuracy_ratio: Some(1.5),
            original_subtask_count: 0,
            added_subtask_count: 0,
            original_subtasks: vec![],
            added_subtasks: vec![],
            stall_events: vec![],
            outcome: Outcome::Completed,
            completed_at: task.completed_at.unwrap_or_else(Utc::now),
            days_overdue: 0,
            keyword_fingerprint: vec![],
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_keyword_search_scopes_and_orders() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        let older = completed("u1", "Plan team offsite", 10);
        let newer = completed("u1", "Offsite retro", 1);
        let other_user = completed("u2", "Plan offsite", 1);
        let open = Task::new(UserId::new("u1"), "Offsite budget");
        let mut deleted = completed("u1", "Offsite venue", 2);
        deleted.deleted_at = Some(Utc::now());

        for t in [&older, &newer, &other_user, &open, &deleted] {
            storage.save_task(t).await.unwrap();
        }

        let keywords = vec!["OFFSITE".to_string()];
        let found = storage
            .find_completed_by_keyword(&UserId::new("u1"), &keywords, 20)
            .await
            .unwrap();
        let ids: Vec<_> = found.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);

        let capped = storage
            .find_completed_by_keyword(&UserId::new("u1"), &keywords, 1)
            .await
            .unwrap();
        assert_eq!(capped.len(), 1);
        assert!(storage
            .find_completed_by_keyword(&UserId::new("u1"), &[], 20)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_history_lookup_is_user_scoped() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        let mine = completed("u1", "Plan team offsite", 3);
        let theirs = completed("u2", "Plan offsite", 3);
        storage.insert_history(&history(&mine)).await.unwrap();
        storage.insert_history(&history(&theirs)).await.unwrap();

        let found = storage
            .find_by_task_ids(&UserId::new("u1"), &[mine.id, theirs.id, TaskId::new()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].task_id, mine.id);
        assert_eq!(found[0].accuracy_ratio, Some(1.5));
    }

    #[tokio::test]
    async fn test_second_history_record_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        let task = completed("u1", "Write report", 1);
        let first = history(&task);
        storage.insert_history(&first).await.unwrap();

        let err = storage.insert_history(&history(&task)).await.unwrap_err();
        assert!(matches!(err, StorageError::Other(_)));

        let found = storage
            .find_by_task_ids(&UserId::new("u1"), &[task.id])
            .await
            .unwrap();
        assert_eq!(found, vec![first]);
    }

    #[tokio::test]
    async fn test_task_round_trip_and_update() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();

        let task = Task::new(UserId::new("u1"), "Write report");
        storage.save_task(&task).await.unwrap();

        let patch = TaskPatch {
            estimated_minutes: Some(90),
            ..Default::default()
        };
        let updated = storage.update_task(task.id, &patch).await.unwrap();
        assert_eq!(updated.estimated_minutes, Some(90));

        let loaded = storage.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(loaded.estimated_minutes, Some(90));
        assert_eq!(loaded.status, TaskStatus::Todo);
    }

    #[tokio::test]
    async fn test_children_are_listed_in_sort_order() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        let parent = Task::new(UserId::new("u1"), "Parent");
        storage.save_task(&parent).await.unwrap();

        for (title, order) in [("second", 2), ("first", 1)] {
            let subtask = NewSubtask {
                title: title.to_string(),
                estimated_minutes: Some(15),
                metadata: taskwise_core::TaskMetadata {
                    sort_order: Some(order),
                    ..Default::default()
                },
            };
            storage.insert_child(parent.id, subtask).await.unwrap();
        }

        let children = storage.list_children(parent.id).await.unwrap();
        let titles: Vec<_> = children.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_proposal_status_update() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        let record = ProposalRecord::pending(
            ProposalId::new(),
            UserId::new("u1"),
            None,
            EnrichmentProposal::minimal(60),
            AiCallMetadata::default(),
        );
        let id = storage.insert_proposal(&record).await.unwrap();

        storage
            .update_proposal_status(id, ProposalStatus::Accepted, &[EnrichmentField::Title], None)
            .await
            .unwrap();

        let loaded = storage.get_proposal(id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ProposalStatus::Accepted);
        assert_eq!(loaded.accepted_fields, vec![EnrichmentField::Title]);
    }

    #[tokio::test]
    async fn test_missing_proposal_update_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        let err = storage
            .update_proposal_status(ProposalId::new(), ProposalStatus::Rejected, &[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }
}
