//! Enrichment error types.

use taskwise_core::{ProposalId, TaskId};
use taskwise_storage::StorageError;

/// Result type for enrichment operations.
pub type Result<T> = std::result::Result<T, EnrichmentError>;

/// Errors surfaced by enrichment.
///
/// Model failures never appear here; they degrade into fallback proposals.
#[derive(Debug, thiserror::Error)]
pub enum EnrichmentError {
    /// Task missing or soft-deleted
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    /// Proposal missing from both the store and the cache
    #[error("Proposal not found: {0}")]
    ProposalNotFound(ProposalId),

    /// Entity exists but belongs to another user
    #[error("{0} is not accessible to this user")]
    Unauthorized(String),

    /// Storage failure
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl EnrichmentError {
    /// Whether the target could not be found.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EnrichmentError::TaskNotFound(_) | EnrichmentError::ProposalNotFound(_)
        )
    }

    /// Whether access should be denied; unauthorized reads as not found.
    pub fn is_denied(&self) -> bool {
        self.is_not_found() || matches!(self, EnrichmentError::Unauthorized(_))
    }
}
