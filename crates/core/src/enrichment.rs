//! Enrichment model - inputs to and outputs of AI task enrichment.

use serde::{Deserialize, Serialize};
use crate::history::{AggregatedInsights, SimilarTaskMatch};
use crate::id::{ProjectId, ProposalId, TaskId, UserId};
use crate::task::{Priority, SubtaskType, Task};
use crate::{ParseLabelError, Time};

/// Minimal input to enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Task title (non-empty)
    pub title: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Owning project
    #[serde(default)]
    pub project_id: Option<ProjectId>,

    /// Existing tags
    #[serde(default)]
    pub tags: Vec<String>,
}

impl TaskDescriptor {
    /// Descriptor with only a title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            project_id: None,
            tags: Vec::new(),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Title and description joined for text analysis.
    pub fn text(&self) -> String {
        match &self.description {
            Some(d) => format!("{} {}", self.title, d),
            None => self.title.clone(),
        }
    }
}

impl From<&Task> for TaskDescriptor {
    fn from(task: &Task) -> Self {
        Self {
            title: task.title.clone(),
            description: task.description.clone(),
            project_id: task.project_id,
            tags: task.metadata.tags.clone(),
        }
    }
}

/// A complete, not-yet-committed task definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentProposal {
    /// Refined title
    pub title: String,

    /// Refined description
    pub description: String,

    /// Suggested due date
    pub due_date: Option<Time>,

    /// Suggested estimate in minutes
    pub estimated_minutes: u32,

    /// Suggested priority
    pub priority: Priority,

    /// Ordered subtask plan
    pub subtasks: Vec<ProposedSubtask>,
}

impl EnrichmentProposal {
    /// The proposal used when the model gave nothing usable.
    pub fn minimal(default_estimate: u32) -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            due_date: None,
            estimated_minutes: default_estimate,
            priority: Priority::None,
            subtasks: Vec::new(),
        }
    }

    /// Sum of subtask estimates.
    pub fn subtask_minutes(&self) -> u32 {
        self.subtasks.iter().map(|s| s.estimated_minutes).sum()
    }
}

/// One proposed subtask.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedSubtask {
    /// Subtask title
    pub title: String,

    /// Estimate in minutes
    pub estimated_minutes: u32,

    /// Kind of work
    #[serde(rename = "type")]
    pub subtask_type: SubtaskType,

    /// Whether an assistant could do it
    pub ai_can_do: bool,

    /// Suggested position, 1-based
    pub order: u32,
}

/// Model self-reported confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Little grounding
    Low,
    /// Some grounding
    #[default]
    Medium,
    /// Well grounded
    High,
}

impl std::str::FromStr for Confidence {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Confidence::Low),
            "medium" => Ok(Confidence::Medium),
            "high" => Ok(Confidence::High),
            _ => Err(ParseLabelError::new("confidence", s)),
        }
    }
}

/// Proposal fields a user can accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentField {
    /// Title
    Title,
    /// Description
    Description,
    /// Due date
    DueDate,
    /// Estimate
    EstimatedMinutes,
    /// Priority
    Priority,
    /// Subtask plan
    Subtasks,
}

impl std::str::FromStr for EnrichmentField {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "title" => Ok(EnrichmentField::Title),
            "description" => Ok(EnrichmentField::Description),
            "due_date" | "dueDate" => Ok(EnrichmentField::DueDate),
            "estimated_minutes" | "estimatedMinutes" => Ok(EnrichmentField::EstimatedMinutes),
            "priority" => Ok(EnrichmentField::Priority),
            "subtasks" => Ok(EnrichmentField::Subtasks),
            _ => Err(ParseLabelError::new("field", s)),
        }
    }
}

/// User overrides for accepted fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldModifications {
    /// Title override
    #[serde(default)]
    pub title: Option<String>,
    /// Description override
    #[serde(default)]
    pub description: Option<String>,
    /// Due date override
    #[serde(default)]
    pub due_date: Option<Time>,
    /// Estimate override
    #[serde(default)]
    pub estimated_minutes: Option<u32>,
    /// Priority override
    #[serde(default)]
    pub priority: Option<Priority>,
}

/// Lifecycle of a durable proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    /// Awaiting user review
    Pending,
    /// At least one field accepted
    Accepted,
    /// Nothing accepted
    Rejected,
}

/// Bookkeeping about the model call behind a proposal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiCallMetadata {
    /// Model name reported by the provider
    pub model: String,
    /// Provider name
    pub provider: String,
    /// Prompt tokens
    pub input_tokens: u32,
    /// Completion tokens
    pub output_tokens: u32,
    /// Wall-clock latency
    pub latency_ms: u64,
}

/// Insight block returned alongside a proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentInsights {
    /// Number of similar tasks used as grounding
    pub similar_task_count: usize,

    /// Statistics over the similar tasks
    pub aggregated: AggregatedInsights,

    /// Model self-reported confidence
    pub confidence: Confidence,

    /// Estimated chance of success, as a percentage
    pub success_probability: u8,

    /// Risks named by the model or raised by degraded phases
    pub risk_factors: Vec<String>,
}

/// Similarity analysis kept next to a proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityAnalysis {
    /// Matches used as grounding
    pub similar_tasks: Vec<SimilarTaskMatch>,

    /// Insight block
    pub insights: EnrichmentInsights,
}

/// Durable proposal record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalRecord {
    /// Unique identifier
    pub id: ProposalId,

    /// Owning user
    pub user_id: UserId,

    /// Task the proposal is attached to
    pub task_id: Option<TaskId>,

    /// The proposal itself
    pub proposal: EnrichmentProposal,

    /// Review status
    pub status: ProposalStatus,

    /// Fields the user accepted
    #[serde(default)]
    pub accepted_fields: Vec<EnrichmentField>,

    /// User overrides
    #[serde(default)]
    pub modifications: Option<FieldModifications>,

    /// Model call bookkeeping
    pub metadata: AiCallMetadata,

    /// Creation timestamp
    pub created_at: Time,

    /// Last update timestamp
    pub updated_at: Time,
}

impl ProposalRecord {
    /// New pending record.
    pub fn pending(
        id: ProposalId,
        user_id: UserId,
        task_id: Option<TaskId>,
        proposal: EnrichmentProposal,
        metadata: AiCallMetadata,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id,
            user_id,
            task_id,
            proposal,
            status: ProposalStatus::Pending,
            accepted_fields: Vec::new(),
            modifications: None,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_parsing_accepts_both_spellings() {
        assert_eq!("dueDate".parse::<EnrichmentField>().unwrap(), EnrichmentField::DueDate);
        assert_eq!("due_date".parse::<EnrichmentField>().unwrap(), EnrichmentField::DueDate);
        assert!("owner".parse::<EnrichmentField>().is_err());
    }

    #[test]
    fn test_minimal_proposal() {
        let proposal = EnrichmentProposal::minimal(60);
        assert!(proposal.title.is_empty());
        assert_eq!(proposal.estimated_minutes, 60);
        assert_eq!(proposal.priority, Priority::None);
        assert!(proposal.subtasks.is_empty());
        assert_eq!(proposal.subtask_minutes(), 0);
    }

    #[test]
    fn test_subtask_serializes_type_key() {
        let subtask = ProposedSubtask {
            title: "Draft agenda".to_string(),
            estimated_minutes: 30,
            subtask_type: SubtaskType::Draft,
            ai_can_do: true,
            order: 1,
        };
        let json = serde_json::to_value(&subtask).unwrap();
        assert_eq!(json["type"], "draft");

        let mut proposal = EnrichmentProposal::minimal(60);
        proposal.subtasks = vec![subtask.clone(), ProposedSubtask { estimated_minutes: 45, ..subtask }];
        assert_eq!(proposal.subtask_minutes(), 75);
    }
}
