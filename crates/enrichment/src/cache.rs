//! Short-lived proposal cache.
//!
//! Holds proposals for tasks that may not exist yet, between the enrichment
//! call and the user's review. Eviction is lazy: expired entries are dropped
//! on `get` and swept on every `put`. There is no background timer.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use taskwise_core::{AiCallMetadata, EnrichmentProposal, ProposalId, SimilarityAnalysis, UserId};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Default time-to-live of a cached proposal.
pub const DEFAULT_PROPOSAL_TTL: Duration = Duration::from_secs(5 * 60);

/// A proposal waiting for review.
#[derive(Debug, Clone)]
pub struct CachedProposal {
    /// Opaque identifier handed to the caller
    pub id: ProposalId,
    /// Requesting user
    pub user_id: UserId,
    /// The proposal
    pub proposal: EnrichmentProposal,
    /// Similar tasks and insights behind it
    pub analysis: SimilarityAnalysis,
    /// Model call bookkeeping
    pub metadata: AiCallMetadata,
    /// When it was stored
    pub stored_at: Instant,
}

/// Keyed store for unattached proposals.
///
/// In-process by default; a shared TTL store can implement the same trait
/// when several instances serve one user.
#[async_trait]
pub trait ProposalCache: Send + Sync {
    /// Store a proposal under a fresh identifier.
    async fn put(
        &self,
        user_id: UserId,
        proposal: EnrichmentProposal,
        analysis: SimilarityAnalysis,
        metadata: AiCallMetadata,
    ) -> ProposalId;

    /// Fetch a live proposal; expired entries are evicted and read as absent.
    async fn get(&self, id: ProposalId) -> Option<CachedProposal>;

    /// Drop an entry.
    async fn remove(&self, id: ProposalId);
}

/// Map-backed [`ProposalCache`].
#[derive(Debug, Clone)]
pub struct InMemoryProposalCache {
    entries: Arc<Mutex<HashMap<ProposalId, CachedProposal>>>,
    ttl: Duration,
}

impl InMemoryProposalCache {
    /// Create a cache with the default TTL.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl: DEFAULT_PROPOSAL_TTL,
        }
    }

    /// Override the TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Number of entries held, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the cache holds nothing.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    fn is_expired(&self, entry: &CachedProposal, now: Instant) -> bool {
        now.duration_since(entry.stored_at) > self.ttl
    }
}

impl Default for InMemoryProposalCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProposalCache for InMemoryProposalCache {
    async fn put(
        &self,
        user_id: UserId,
        proposal: EnrichmentProposal,
        analysis: SimilarityAnalysis,
        metadata: AiCallMetadata,
    ) -> ProposalId {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let before = entries.len();
        entries.retain(|_, entry| !self.is_expired(entry, now));
        if entries.len() < before {
            debug!("Swept {} expired proposals", before - entries.len());
        }

        let id = ProposalId::new();
        entries.insert(
            id,
            CachedProposal {
                id,
                user_id,
                proposal,
                analysis,
                metadata,
                stored_at: now,
            },
        );
        id
    }

    async fn get(&self, id: ProposalId) -> Option<CachedProposal> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let expired = self.is_expired(entries.get(&id)?, now);
        if expired {
            debug!("Proposal {} expired", id);
            entries.remove(&id);
            return None;
        }
        entries.get(&id).cloned()
    }

    async fn remove(&self, id: ProposalId) {
        self.entries.lock().await.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskwise_core::{AggregatedInsights, Confidence, EnrichmentInsights};

    fn analysis() -> SimilarityAnalysis {
        SimilarityAnalysis {
            similar_tasks: vec![],
            insights: EnrichmentInsights {
                similar_task_count: 0,
                aggregated: AggregatedInsights::default(),
                confidence: Confidence::Medium,
                success_probability: 65,
                risk_factors: vec![],
            },
        }
    }

    async fn put(cache: &InMemoryProposalCache) -> ProposalId {
        cache
            .put(
                UserId::new("u1"),
                EnrichmentProposal::minimal(60),
                analysis(),
                AiCallMetadata::default(),
            )
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_after_put() {
        let cache = InMemoryProposalCache::new();
        let id = put(&cache).await;
        let cached = cache.get(id).await.unwrap();
        assert_eq!(cached.id, id);
        assert_eq!(cached.proposal.estimated_minutes, 60);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expires_after_ttl() {
        let cache = InMemoryProposalCache::new();
        let id = put(&cache).await;

        tokio::time::advance(Duration::from_secs(4 * 60)).await;
        assert!(cache.get(id).await.is_some());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.get(id).await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_sweeps_expired_entries() {
        let cache = InMemoryProposalCache::new().with_ttl(Duration::from_secs(10));
        put(&cache).await;
        put(&cache).await;

        tokio::time::advance(Duration::from_secs(11)).await;
        let fresh = put(&cache).await;

        assert_eq!(cache.len().await, 1);
        assert!(cache.get(fresh).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ids_are_unique() {
        let cache = InMemoryProposalCache::new();
        let a = put(&cache).await;
        let b = put(&cache).await;
        assert_ne!(a, b);
    }
}
