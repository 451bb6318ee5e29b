//! Enrichment applier - commits the fields a user accepted.

use std::collections::HashSet;
use std::sync::Arc;
use taskwise_core::{
    EnrichmentField, FieldModifications, NewSubtask, ProposalId, ProposalRecord, ProposalStatus,
    Task, TaskId, TaskMetadata, TaskPatch, TaskSource, UserId,
};
use taskwise_storage::{ProposalStore, TaskStore};
use tracing::{debug, info};

use crate::cache::ProposalCache;
use crate::error::{EnrichmentError, Result};

/// Where a proposal was found.
enum Source {
    Stored(ProposalRecord),
    Cached(ProposalRecord),
}

/// Applies reviewed proposals to tasks.
#[derive(Clone)]
pub struct EnrichmentApplier {
    tasks: Arc<dyn TaskStore>,
    proposals: Arc<dyn ProposalStore>,
    cache: Arc<dyn ProposalCache>,
}

impl EnrichmentApplier {
    /// Create a new applier.
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        proposals: Arc<dyn ProposalStore>,
        cache: Arc<dyn ProposalCache>,
    ) -> Self {
        Self {
            tasks,
            proposals,
            cache,
        }
    }

    /// Commit `accepted` fields of a proposal to a task.
    ///
    /// Each accepted field takes the user's modification when given, else the
    /// proposed value; other fields are left alone. An empty list rejects the
    /// proposal without touching the task. A proposal still in the cache is
    /// persisted against the task first.
    pub async fn apply(
        &self,
        user_id: &UserId,
        task_id: TaskId,
        proposal_id: ProposalId,
        accepted: &[EnrichmentField],
        modifications: Option<&FieldModifications>,
    ) -> Result<Task> {
        let source = self.find_proposal(user_id, task_id, proposal_id).await?;

        let task = self
            .tasks
            .get_task(task_id)
            .await?
            .filter(|t| !t.is_deleted())
            .ok_or(EnrichmentError::TaskNotFound(task_id))?;
        if !task.is_owned_by(user_id) {
            return Err(EnrichmentError::Unauthorized(format!("Task {}", task_id)));
        }

        let record = match source {
            Source::Stored(record) => record,
            Source::Cached(record) => {
                self.proposals.insert_proposal(&record).await?;
                self.cache.remove(proposal_id).await;
                debug!("Promoted cached proposal {} to task {}", proposal_id, task_id);
                record
            }
        };

        // Children first, skipping any already inserted from this proposal;
        // the task patch and the status change come after.
        if accepted.contains(&EnrichmentField::Subtasks) {
            self.insert_subtasks(task_id, &record).await?;
        }

        let patch = build_patch(&record, accepted, modifications);
        let updated = if patch.is_empty() {
            task
        } else {
            self.tasks.update_task(task_id, &patch).await?
        };

        let status = if accepted.is_empty() {
            ProposalStatus::Rejected
        } else {
            ProposalStatus::Accepted
        };
        self.proposals
            .update_proposal_status(proposal_id, status, accepted, modifications)
            .await?;

        info!(
            "Proposal {} {:?} for task {} ({} fields)",
            proposal_id,
            status,
            task_id,
            accepted.len()
        );
        Ok(updated)
    }

    async fn insert_subtasks(&self, task_id: TaskId, record: &ProposalRecord) -> Result<()> {
        let existing: HashSet<(String, Option<u32>)> = self
            .tasks
            .list_children(task_id)
            .await?
            .into_iter()
            .filter(|c| c.metadata.is_ai_suggested())
            .map(|c| (c.title, c.metadata.sort_order))
            .collect();

        let mut subtasks = record.proposal.subtasks.clone();
        subtasks.sort_by_key(|s| s.order);
        for subtask in subtasks {
            if existing.contains(&(subtask.title.clone(), Some(subtask.order))) {
                debug!("Subtask '{}' already on task {}", subtask.title, task_id);
                continue;
            }
            self.tasks
                .insert_child(
                    task_id,
                    NewSubtask {
                        title: subtask.title,
                        estimated_minutes: Some(subtask.estimated_minutes),
                        metadata: TaskMetadata {
                            source: Some(TaskSource::AiSuggested),
                            subtask_type: Some(subtask.subtask_type),
                            ai_can_do: subtask.ai_can_do,
                            sort_order: Some(subtask.order),
                            ..Default::default()
                        },
                    },
                )
                .await?;
        }
        Ok(())
    }

    async fn find_proposal(
        &self,
        user_id: &UserId,
        task_id: TaskId,
        proposal_id: ProposalId,
    ) -> Result<Source> {
        if let Some(record) = self.proposals.get_proposal(proposal_id).await? {
            if &record.user_id != user_id {
                return Err(EnrichmentError::Unauthorized(format!("Proposal {}", proposal_id)));
            }
            return Ok(Source::Stored(record));
        }

        let cached = self
            .cache
            .get(proposal_id)
            .await
            .ok_or(EnrichmentError::ProposalNotFound(proposal_id))?;
        if &cached.user_id != user_id {
            return Err(EnrichmentError::Unauthorized(format!("Proposal {}", proposal_id)));
        }

        Ok(Source::Cached(ProposalRecord::pending(
            proposal_id,
            cached.user_id,
            Some(task_id),
            cached.proposal,
            cached.metadata,
        )))
    }
}

fn build_patch(
    record: &ProposalRecord,
    accepted: &[EnrichmentField],
    modifications: Option<&FieldModifications>,
) -> TaskPatch {
    let proposal = &record.proposal;
    let empty = FieldModifications::default();
    let mods = modifications.unwrap_or(&empty);
    let mut patch = TaskPatch::default();

    for field in accepted {
        match field {
            EnrichmentField::Title => {
                patch.title = Some(mods.title.clone().unwrap_or_else(|| proposal.title.clone()));
            }
            EnrichmentField::Description => {
                patch.description = Some(
                    mods.description
                        .clone()
                        .unwrap_or_else(|| proposal.description.clone()),
                );
            }
            EnrichmentField::DueDate => {
                patch.due_date = Some(mods.due_date.or(proposal.due_date));
            }
            EnrichmentField::EstimatedMinutes => {
                patch.estimated_minutes =
                    Some(mods.estimated_minutes.unwrap_or(proposal.estimated_minutes));
            }
            EnrichmentField::Priority => {
                patch.priority = Some(mods.priority.unwrap_or(proposal.priority));
            }
            EnrichmentField::Subtasks => {}
        }
    }
    patch
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use taskwise_core::{
        AiCallMetadata, EnrichmentProposal, Priority, ProposedSubtask, SubtaskType,
    };
    use taskwise_storage::MemoryStorage;

    use crate::cache::InMemoryProposalCache;

    fn proposal() -> EnrichmentProposal {
        EnrichmentProposal {
            title: "Plan Q3 offsite".to_string(),
            description: "Venue, agenda and travel".to_string(),
            due_date: Some(Utc.with_ymd_and_hms(2030, 1, 15, 17, 0, 0).unwrap()),
            estimated_minutes: 300,
            priority: Priority::High,
            subtasks: vec![
                ProposedSubtask {
                    title: "Book venue".to_string(),
                    estimated_minutes: 60,
                    subtask_type: SubtaskType::Action,
                    ai_can_do: false,
                    order: 2,
                },
                ProposedSubtask {
                    title: "Research venues".to_string(),
                    estimated_minutes: 90,
                    subtask_type: SubtaskType::Research,
                    ai_can_do: true,
                    order: 1,
                },
            ],
        }
    }

    struct Fixture {
        storage: Arc<MemoryStorage>,
        cache: Arc<InMemoryProposalCache>,
        applier: EnrichmentApplier,
        task: Task,
        proposal_id: ProposalId,
    }

    async fn fixture() -> Fixture {
        let storage = Arc::new(MemoryStorage::new());
        let cache = Arc::new(InMemoryProposalCache::new());
        let applier = EnrichmentApplier::new(storage.clone(), storage.clone(), cache.clone());

        let mut task = Task::new(UserId::new("u1"), "offsite");
        task.description = Some("team thing".to_string());
        storage.save_task(&task).await.unwrap();

        let proposal_id = ProposalId::new();
        storage
            .insert_proposal(&ProposalRecord::pending(
                proposal_id,
                UserId::new("u1"),
                Some(task.id),
                proposal(),
                AiCallMetadata::default(),
            ))
            .await
            .unwrap();

        Fixture {
            storage,
            cache,
            applier,
            task,
            proposal_id,
        }
    }

    #[tokio::test]
    async fn test_empty_accept_rejects_and_leaves_task() {
        let f = fixture().await;

        let task = f
            .applier
            .apply(&UserId::new("u1"), f.task.id, f.proposal_id, &[], None)
            .await
            .unwrap();

        assert_eq!(task, f.task);
        let stored = f.storage.get_task(f.task.id).await.unwrap().unwrap();
        assert_eq!(stored, f.task);
        let record = f.storage.get_proposal(f.proposal_id).await.unwrap().unwrap();
        assert_eq!(record.status, ProposalStatus::Rejected);
        assert!(record.accepted_fields.is_empty());
    }

    #[tokio::test]
    async fn test_accepted_fields_only() {
        let f = fixture().await;
        let mods = FieldModifications {
            estimated_minutes: Some(240),
            description: Some("ignored, not accepted".to_string()),
            ..Default::default()
        };

        let task = f
            .applier
            .apply(
                &UserId::new("u1"),
                f.task.id,
                f.proposal_id,
                &[EnrichmentField::Title, EnrichmentField::EstimatedMinutes],
                Some(&mods),
            )
            .await
            .unwrap();

        assert_eq!(task.title, "Plan Q3 offsite");
        assert_eq!(task.estimated_minutes, Some(240));
        assert_eq!(task.description.as_deref(), Some("team thing"));
        assert_eq!(task.priority, Priority::None);
        assert!(task.due_date.is_none());

        let record = f.storage.get_proposal(f.proposal_id).await.unwrap().unwrap();
        assert_eq!(record.status, ProposalStatus::Accepted);
        assert_eq!(
            record.accepted_fields,
            vec![EnrichmentField::Title, EnrichmentField::EstimatedMinutes]
        );
        assert_eq!(record.modifications, Some(mods));
    }

    #[tokio::test]
    async fn test_subtasks_inserted_with_provenance() {
        let f = fixture().await;

        f.applier
            .apply(
                &UserId::new("u1"),
                f.task.id,
                f.proposal_id,
                &[EnrichmentField::Subtasks],
                None,
            )
            .await
            .unwrap();

        let children = f.storage.list_children(f.task.id).await.unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].title, "Research venues");
        assert_eq!(children[0].metadata.sort_order, Some(1));
        assert!(children[0].metadata.ai_can_do);
        assert_eq!(children[0].metadata.subtask_type, Some(SubtaskType::Research));
        assert!(children.iter().all(|c| c.metadata.is_ai_suggested()));
        assert!(children.iter().all(|c| c.user_id == f.task.user_id));
    }

    #[tokio::test]
    async fn test_retry_does_not_duplicate_subtasks() {
        let f = fixture().await;
        // A first attempt got one child in before failing
        f.storage
            .insert_child(
                f.task.id,
                NewSubtask {
                    title: "Research venues".to_string(),
                    estimated_minutes: Some(90),
                    metadata: TaskMetadata {
                        source: Some(TaskSource::AiSuggested),
                        subtask_type: Some(SubtaskType::Research),
                        ai_can_do: true,
                        sort_order: Some(1),
                        ..Default::default()
                    },
                },
            )
            .await
            .unwrap();

        let accepted = [EnrichmentField::Subtasks, EnrichmentField::Title];
        let user = UserId::new("u1");
        f.applier.apply(&user, f.task.id, f.proposal_id, &accepted, None).await.unwrap();
        f.applier.apply(&user, f.task.id, f.proposal_id, &accepted, None).await.unwrap();

        let children = f.storage.list_children(f.task.id).await.unwrap();
        let titles: Vec<_> = children.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Research venues", "Book venue"]);
        let task = f.storage.get_task(f.task.id).await.unwrap().unwrap();
        assert_eq!(task.title, "Plan Q3 offsite");
    }

    #[tokio::test]
    async fn test_cached_proposal_is_promoted() {
        let f = fixture().await;
        let analysis = taskwise_core::SimilarityAnalysis {
            similar_tasks: vec![],
            insights: taskwise_core::EnrichmentInsights {
                similar_task_count: 0,
                aggregated: Default::default(),
                confidence: Default::default(),
                success_probability: 65,
                risk_factors: vec![],
            },
        };
        let cached_id = f
            .cache
            .put(UserId::new("u1"), proposal(), analysis, AiCallMetadata::default())
            .await;

        let task = f
            .applier
            .apply(
                &UserId::new("u1"),
                f.task.id,
                cached_id,
                &[EnrichmentField::Priority, EnrichmentField::DueDate],
                None,
            )
            .await
            .unwrap();

        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.due_date, proposal().due_date);
        let record = f.storage.get_proposal(cached_id).await.unwrap().unwrap();
        assert_eq!(record.task_id, Some(f.task.id));
        assert_eq!(record.status, ProposalStatus::Accepted);
        assert!(f.cache.get(cached_id).await.is_none());
    }

    #[tokio::test]
    async fn test_not_found_and_unauthorized() {
        let f = fixture().await;

        let err = f
            .applier
            .apply(&UserId::new("u1"), f.task.id, ProposalId::new(), &[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, EnrichmentError::ProposalNotFound(_)));

        let err = f
            .applier
            .apply(&UserId::new("u2"), f.task.id, f.proposal_id, &[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, EnrichmentError::Unauthorized(_)));
        assert!(err.is_denied());

        let err = f
            .applier
            .apply(&UserId::new("u1"), TaskId::new(), f.proposal_id, &[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, EnrichmentError::TaskNotFound(_)));

        // Nothing was written on the failed attempts
        let record = f.storage.get_proposal(f.proposal_id).await.unwrap().unwrap();
        assert_eq!(record.status, ProposalStatus::Pending);
    }

    #[tokio::test]
    async fn test_deleted_task_is_not_found() {
        let f = fixture().await;
        let mut deleted = f.task.clone();
        deleted.deleted_at = Some(Utc::now());
        f.storage.save_task(&deleted).await.unwrap();

        let err = f
            .applier
            .apply(
                &UserId::new("u1"),
                f.task.id,
                f.proposal_id,
                &[EnrichmentField::Title],
                None,
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
