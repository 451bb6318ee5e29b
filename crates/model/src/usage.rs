//! Model usage tracking.

use async_trait::async_trait;
use std::sync::Arc;
use taskwise_core::UserId;
use tokio::sync::Mutex;
use tracing::info;

/// One recorded model invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageEvent {
    /// Requesting user
    pub user_id: UserId,
    /// Provider name
    pub provider: String,
    /// Model name
    pub model: String,
    /// Feature that made the call
    pub feature: String,
    /// Prompt tokens
    pub input_tokens: u32,
    /// Completion tokens
    pub output_tokens: u32,
}

/// Sink for token/cost accounting, called once per model invocation.
#[async_trait]
pub trait UsageTracker: Send + Sync {
    /// Record one invocation.
    async fn track_usage(&self, event: UsageEvent);
}

/// Tracker that only logs.
#[derive(Debug, Clone, Default)]
pub struct TracingUsageTracker;

#[async_trait]
impl UsageTracker for TracingUsageTracker {
    async fn track_usage(&self, event: UsageEvent) {
        info!(
            user = %event.user_id,
            provider = %event.provider,
            model = %event.model,
            feature = %event.feature,
            input_tokens = event.input_tokens,
            output_tokens = event.output_tokens,
            "model usage"
        );
    }
}

/// Tracker that keeps every event in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUsageTracker {
    events: Arc<Mutex<Vec<UsageEvent>>>,
}

impl InMemoryUsageTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events.
    pub async fn events(&self) -> Vec<UsageEvent> {
        self.events.lock().await.clone()
    }

    /// Events recorded for one feature.
    pub async fn events_for(&self, feature: &str) -> Vec<UsageEvent> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|e| e.feature == feature)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl UsageTracker for InMemoryUsageTracker {
    async fn track_usage(&self, event: UsageEvent) {
        self.events.lock().await.push(event);
    }
}
