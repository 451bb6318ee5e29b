//! End-to-end similar-task search: keywords, candidates, scores, insights.

use taskwise_core::{AggregatedInsights, SimilarTaskMatch, TaskDescriptor, UserId};
use taskwise_storage::Result;
use tracing::debug;

use crate::insights::aggregate;
use crate::keywords::extract_keywords;
use crate::retriever::{CandidateRetriever, DEFAULT_CANDIDATE_LIMIT};
use crate::scorer::SimilarityScorer;

/// Result of one similarity search.
#[derive(Debug, Clone)]
pub struct SimilarTasks {
    /// Keywords extracted from the query
    pub keywords: Vec<String>,

    /// Matches at or above the scoring floor, best first
    pub matches: Vec<SimilarTaskMatch>,

    /// Aggregated execution history of the matches
    pub insights: AggregatedInsights,

    /// True when semantic scoring fell back to keywords only
    pub degraded: bool,
}

/// Two-phase similar-task search.
#[derive(Clone)]
pub struct SimilarityFinder {
    retriever: CandidateRetriever,
    scorer: SimilarityScorer,
    candidate_limit: usize,
}

impl SimilarityFinder {
    /// Create a new finder.
    pub fn new(retriever: CandidateRetriever, scorer: SimilarityScorer) -> Self {
        Self {
            retriever,
            scorer,
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
        }
    }

    /// Set the candidate cap.
    pub fn with_candidate_limit(mut self, limit: usize) -> Self {
        self.candidate_limit = limit;
        self
    }

    /// Find completed tasks of `user_id` similar to `descriptor`.
    ///
    /// Only storage failures are errors; scoring failures degrade.
    pub async fn find(&self, user_id: &UserId, descriptor: &TaskDescriptor) -> Result<SimilarTasks> {
        let keywords = extract_keywords(&descriptor.text());
        let candidates = self
            .retriever
            .retrieve(user_id, &keywords, self.candidate_limit)
            .await?;
        let scored = self.scorer.score(user_id, descriptor, &candidates).await;

        debug!(
            "Similarity search for '{}': {} candidates, {} matches",
            descriptor.title,
            candidates.len(),
            scored.matches.len()
        );

        Ok(SimilarTasks {
            insights: aggregate(&scored.matches),
            keywords,
            matches: scored.matches,
            degraded: scored.degraded,
        })
    }
}
