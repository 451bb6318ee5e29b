//! Semantic scoring - second phase of the similarity search.
//!
//! One model call scores every keyword candidate at once. Any failure
//! (transport, timeout, unparseable reply) degrades to a keyword-only
//! fallback instead of surfacing an error.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;
use serde::Deserialize;
use serde_json::Value;
use taskwise_core::{ExecutionInsights, SimilarTaskMatch, TaskDescriptor, UserId};
use taskwise_model::{extract_json, lenient_list, ChatModel, ChatRequest, UsageEvent, UsageTracker};
use tracing::{debug, warn};

use crate::retriever::Candidate;

/// Feature name reported to the usage tracker.
pub const SCORING_FEATURE: &str = "similarity_scoring";

/// Reason attached to fallback matches.
pub const FALLBACK_REASON: &str = "Matched by keywords";

const SCORING_SYSTEM_PROMPT: &str = "You compare personal tasks. Given a new task and a numbered \
list of completed tasks, rate how similar the work of each completed task is to the new task on a \
0-100 scale and give short reasons. Respond with JSON only, in the form \
{\"matches\": [{\"index\": <number>, \"score\": <0-100>, \"reasons\": [\"...\"]}]}.";

/// Scorer settings.
#[derive(Debug, Clone)]
pub struct ScorerConfig {
    /// Model override
    pub model: Option<String>,
    /// Output token cap
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Matches scoring below this are noise and dropped
    pub min_score: u8,
    /// Score given to every candidate when scoring fails
    pub fallback_score: u8,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: 1024,
            temperature: 0.2,
            min_score: 20,
            fallback_score: 50,
        }
    }
}

/// Scored matches plus whether they came from the fallback path.
#[derive(Debug, Clone, Default)]
pub struct ScoredMatches {
    /// Matches at or above the floor, best first
    pub matches: Vec<SimilarTaskMatch>,
    /// True when semantic scoring was unavailable
    pub degraded: bool,
}

/// `{"matches": [...]}` or a bare array of entries.
#[derive(Deserialize)]
#[serde(untagged)]
enum ScoreResponse {
    Bare(Vec<Value>),
    Wrapped {
        #[serde(deserialize_with = "lenient_list")]
        matches: Vec<ScoreEntry>,
    },
}

impl ScoreResponse {
    fn into_entries(self) -> Vec<ScoreEntry> {
        match self {
            ScoreResponse::Bare(items) => items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
            ScoreResponse::Wrapped { matches } => matches,
        }
    }
}

#[derive(Deserialize)]
struct ScoreEntry {
    index: usize,
    score: f64,
    #[serde(default, deserialize_with = "lenient_list")]
    reasons: Vec<String>,
}

/// Scores keyword candidates against a new task.
#[derive(Clone)]
pub struct SimilarityScorer {
    model: Arc<dyn ChatModel>,
    usage: Arc<dyn UsageTracker>,
    config: ScorerConfig,
}

impl SimilarityScorer {
    /// Create a new scorer.
    pub fn new(model: Arc<dyn ChatModel>, usage: Arc<dyn UsageTracker>) -> Self {
        Self {
            model,
            usage,
            config: ScorerConfig::default(),
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: ScorerConfig) -> Self {
        self.config = config;
        self
    }

    /// Score candidates; never fails.
    pub async fn score(
        &self,
        user_id: &UserId,
        descriptor: &TaskDescriptor,
        candidates: &[Candidate],
    ) -> ScoredMatches {
        if candidates.is_empty() {
            return ScoredMatches::default();
        }

        let request = ChatRequest::new(
            user_id.clone(),
            SCORING_SYSTEM_PROMPT,
            build_prompt(descriptor, candidates),
        )
        .with_model(self.config.model.clone())
        .with_sampling(self.config.max_tokens, self.config.temperature);

        let response = match self.model.chat(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Similarity scoring call failed, using keyword fallback: {}", e);
                return self.fallback(candidates);
            }
        };

        self.usage
            .track_usage(UsageEvent {
                user_id: user_id.clone(),
                provider: response.provider.clone(),
                model: response.model.clone(),
                feature: SCORING_FEATURE.to_string(),
                input_tokens: response.usage.input_tokens,
                output_tokens: response.usage.output_tokens,
            })
            .await;

        let Some(parsed) = extract_json::<ScoreResponse>(&response.content) else {
            warn!("Similarity scoring reply was not valid JSON, using keyword fallback");
            return self.fallback(candidates);
        };

        let matches = self.map_scores(parsed, candidates);
        debug!(
            "Scored {} candidates, {} above floor {}",
            candidates.len(),
            matches.len(),
            self.config.min_score
        );

        ScoredMatches {
            matches,
            degraded: false,
        }
    }

    fn map_scores(&self, parsed: ScoreResponse, candidates: &[Candidate]) -> Vec<SimilarTaskMatch> {
        let mut seen = HashSet::new();
        let mut matches: Vec<SimilarTaskMatch> = parsed
            .into_entries()
            .into_iter()
            // Indices are 1-based as presented in the prompt
            .filter_map(|entry| {
                let candidate = entry.index.checked_sub(1).and_then(|i| candidates.get(i))?;
                seen.insert(entry.index).then_some((candidate, entry))
            })
            .map(|(candidate, entry)| {
                let score = entry.score.clamp(0.0, 100.0).round() as u8;
                to_match(candidate, score, entry.reasons)
            })
            .filter(|m| m.score >= self.config.min_score)
            .collect();

        matches.sort_by(|a, b| b.score.cmp(&a.score));
        matches
    }

    fn fallback(&self, candidates: &[Candidate]) -> ScoredMatches {
        ScoredMatches {
            matches: candidates
                .iter()
                .map(|c| to_match(c, self.config.fallback_score, vec![FALLBACK_REASON.to_string()]))
                .collect(),
            degraded: true,
        }
    }
}

fn to_match(candidate: &Candidate, score: u8, reasons: Vec<String>) -> SimilarTaskMatch {
    SimilarTaskMatch {
        task_id: candidate.task.id,
        title: candidate.task.title.clone(),
        score,
        reasons,
        insights: candidate
            .history
            .as_ref()
            .map(|h| h.insights())
            .unwrap_or_else(|| ExecutionInsights {
                estimated_vs_actual: taskwise_core::accuracy_ratio(
                    candidate.task.estimated_minutes,
                    candidate.task.actual_minutes,
                ),
                ..Default::default()
            }),
    }
}

fn build_prompt(descriptor: &TaskDescriptor, candidates: &[Candidate]) -> String {
    let mut prompt = String::from("New task:\n");
    let _ = writeln!(prompt, "Title: {}", descriptor.title);
    if let Some(description) = &descriptor.description {
        let _ = writeln!(prompt, "Description: {}", description);
    }

    prompt.push_str("\nCompleted tasks:\n");
    for (i, candidate) in candidates.iter().enumerate() {
        let task = &candidate.task;
        let _ = writeln!(prompt, "{}. Title: {}", i + 1, task.title);
        if let Some(description) = &task.description {
            let _ = writeln!(prompt, "   Description: {}", description);
        }
        match (task.estimated_minutes, task.actual_minutes) {
            (Some(estimate), Some(actual)) => {
                let _ = writeln!(prompt, "   Estimate vs actual: {} min vs {} min", estimate, actual);
            }
            (Some(estimate), None) => {
                let _ = writeln!(prompt, "   Estimate: {} min", estimate);
            }
            _ => {}
        }
        if let Some(history) = &candidate.history {
            let _ = writeln!(
                prompt,
                "   Subtasks added during execution: {}",
                history.added_subtask_count
            );
            let _ = writeln!(prompt, "   Outcome: {}", history.outcome);
        }
    }

    prompt.push_str("\nScore every completed task by its number.");
    prompt
}
