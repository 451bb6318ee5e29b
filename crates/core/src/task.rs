//! Task model - the unit of work the enrichment engine reads and writes.

use serde::{Deserialize, Serialize};
use crate::history::StallEvent;
use crate::id::{ProjectId, TaskId, UserId};
use crate::{ParseLabelError, Time};

/// A task as exposed by the task store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: TaskId,

    /// Owning user
    pub user_id: UserId,

    /// Task title
    pub title: String,

    /// Detailed description
    #[serde(default)]
    pub description: Option<String>,

    /// Current status
    pub status: TaskStatus,

    /// Priority
    #[serde(default)]
    pub priority: Priority,

    /// Planned effort in minutes
    #[serde(default)]
    pub estimated_minutes: Option<u32>,

    /// Effort actually spent in minutes
    #[serde(default)]
    pub actual_minutes: Option<u32>,

    /// Due date
    #[serde(default)]
    pub due_date: Option<Time>,

    /// Completion timestamp
    #[serde(default)]
    pub completed_at: Option<Time>,

    /// Parent task for subtasks
    #[serde(default)]
    pub parent_task_id: Option<TaskId>,

    /// Owning project
    #[serde(default)]
    pub project_id: Option<ProjectId>,

    /// Free-form metadata bag
    #[serde(default)]
    pub metadata: TaskMetadata,

    /// Soft-delete marker
    #[serde(default)]
    pub deleted_at: Option<Time>,

    /// Creation timestamp
    pub created_at: Time,

    /// Last update timestamp
    pub updated_at: Time,
}

impl Task {
    /// Create a new open task for a user.
    pub fn new(user_id: UserId, title: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: TaskId::new(),
            user_id,
            title: title.into(),
            description: None,
            status: TaskStatus::Todo,
            priority: Priority::None,
            estimated_minutes: None,
            actual_minutes: None,
            due_date: None,
            completed_at: None,
            parent_task_id: None,
            project_id: None,
            metadata: TaskMetadata::default(),
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the task belongs to the given user.
    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        &self.user_id == user_id
    }

    /// Whether the task has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether the task is completed.
    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// Case-insensitive substring match against title or description.
    pub fn mentions(&self, keyword: &str) -> bool {
        let needle = keyword.to_lowercase();
        self.title.to_lowercase().contains(&needle)
            || self
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&needle))
    }

    /// Title and description joined for text analysis.
    pub fn text(&self) -> String {
        match &self.description {
            Some(d) => format!("{} {}", self.title, d),
            None => self.title.clone(),
        }
    }

    /// Mark the task completed at the given time.
    pub fn complete(&mut self, at: Time) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(at);
        self.updated_at = at;
    }
}

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started
    Todo,
    /// Being worked on
    InProgress,
    /// Finished
    Completed,
    /// Dropped without completion
    Cancelled,
}

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// No priority assigned
    #[default]
    None,
    /// Low
    Low,
    /// Medium
    Medium,
    /// High
    High,
}

impl Priority {
    /// Label used in prompts and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::None => "none",
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "" => Ok(Priority::None),
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            // Models occasionally answer with a stronger label.
            "high" | "urgent" => Ok(Priority::High),
            _ => Err(ParseLabelError::new("priority", s)),
        }
    }
}

/// Where a task came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSource {
    /// Created by the user
    User,
    /// Inserted from an accepted AI proposal
    AiSuggested,
}

/// Kind of work a subtask represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtaskType {
    /// Concrete doing
    #[default]
    Action,
    /// Finding things out
    Research,
    /// Producing a first version
    Draft,
    /// Organising the work
    Plan,
    /// Checking the result
    Review,
}

impl SubtaskType {
    /// Label used in prompts and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubtaskType::Action => "action",
            SubtaskType::Research => "research",
            SubtaskType::Draft => "draft",
            SubtaskType::Plan => "plan",
            SubtaskType::Review => "review",
        }
    }
}

impl std::str::FromStr for SubtaskType {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "action" => Ok(SubtaskType::Action),
            "research" => Ok(SubtaskType::Research),
            "draft" => Ok(SubtaskType::Draft),
            "plan" => Ok(SubtaskType::Plan),
            "review" => Ok(SubtaskType::Review),
            _ => Err(ParseLabelError::new("subtask type", s)),
        }
    }
}

/// Metadata bag carried by every task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// Provenance tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<TaskSource>,

    /// Subtask kind (AI-suggested subtasks only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtask_type: Option<SubtaskType>,

    /// Whether an assistant could perform the subtask
    #[serde(default)]
    pub ai_can_do: bool,

    /// Position among siblings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<u32>,

    /// User tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Periods where no progress happened
    #[serde(default)]
    pub stall_events: Vec<StallEvent>,
}

impl TaskMetadata {
    /// Whether this task was inserted from an AI proposal.
    pub fn is_ai_suggested(&self) -> bool {
        self.source == Some(TaskSource::AiSuggested)
    }
}

/// Partial update applied by the task store.
///
/// `None` leaves a field untouched; `due_date: Some(None)` clears the due date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    /// New title
    pub title: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New due date
    pub due_date: Option<Option<Time>>,
    /// New estimate
    pub estimated_minutes: Option<u32>,
    /// New priority
    pub priority: Option<Priority>,
}

impl TaskPatch {
    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.due_date.is_none()
            && self.estimated_minutes.is_none()
            && self.priority.is_none()
    }

    /// Apply the patch in place.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = Some(description.clone());
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(minutes) = self.estimated_minutes {
            task.estimated_minutes = Some(minutes);
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        task.updated_at = chrono::Utc::now();
    }
}

/// Fields for a child task inserted under an existing parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSubtask {
    /// Subtask title
    pub title: String,
    /// Planned effort in minutes
    pub estimated_minutes: Option<u32>,
    /// Provenance and ordering metadata
    pub metadata: TaskMetadata,
}

impl NewSubtask {
    /// Build the child task under `parent`, inheriting owner and project.
    pub fn into_task(self, parent: &Task) -> Task {
        let mut task = Task::new(parent.user_id.clone(), self.title);
        task.estimated_minutes = self.estimated_minutes;
        task.parent_task_id = Some(parent.id);
        task.project_id = parent.project_id;
        task.metadata = self.metadata;
        task
    }
}

/// Filter for listing tasks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    /// Restrict to one user
    pub user_id: Option<UserId>,

    /// Filter by status
    pub status: Option<Vec<TaskStatus>>,

    /// Include soft-deleted tasks
    pub include_deleted: bool,
}

impl TaskFilter {
    /// Whether a task passes the filter.
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(user) = &self.user_id {
            if !task.is_owned_by(user) {
                return false;
            }
        }
        if let Some(statuses) = &self.status {
            if !statuses.contains(&task.status) {
                return false;
            }
        }
        self.include_deleted || !task.is_deleted()
    }
}
