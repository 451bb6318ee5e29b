//! Enrichment orchestrator - turns a rough task into a review-ready proposal.
//!
//! Similar-task search, history lookup and the generation call each degrade
//! independently. Every degraded phase leaves a note in the risk factors, so
//! `enrich` always returns a proposal.

use std::sync::Arc;
use std::time::Instant;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use taskwise_core::{
    AggregatedInsights, AiCallMetadata, Confidence, EnrichmentInsights, EnrichmentProposal,
    ExecutionHistoryRecord, Priority, ProposalId, ProposalRecord, ProposedSubtask,
    SimilarTaskMatch, SimilarityAnalysis, SubtaskType, TaskDescriptor, TaskId, Time, UserId,
};
use taskwise_model::{
    extract_json, lenient_list, null_as_default, ChatModel, ChatRequest, ChatResponse, ModelError,
    UsageEvent, UsageTracker,
};
use taskwise_schedule::suggest_due_date;
use taskwise_similarity::{CandidateRetriever, ScorerConfig, SimilarityFinder, SimilarityScorer};
use taskwise_storage::{HistoryStore, ProposalStore, TaskStore};
use tracing::{debug, info, warn};

use crate::cache::{InMemoryProposalCache, ProposalCache};
use crate::error::{EnrichmentError, Result};
use crate::prompts;

/// Feature name for the full enrichment call.
pub const ENRICHMENT_FEATURE: &str = "task_enrichment";
/// Feature name for decomposition-only calls.
pub const SUBTASKS_FEATURE: &str = "subtask_generation";
/// Feature name for duration-only calls.
pub const ESTIMATE_FEATURE: &str = "duration_estimate";

/// Subtask estimate used when the model leaves one out.
const DEFAULT_SUBTASK_MINUTES: u32 = 30;

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    /// Model override
    pub model: Option<String>,
    /// Output token cap for generation calls
    pub max_tokens: u32,
    /// Sampling temperature for generation calls
    pub temperature: f32,
    /// Keyword candidates considered per search
    pub candidate_limit: usize,
    /// History records fed into the prompt
    pub history_limit: usize,
    /// Fewest subtasks requested
    pub min_subtasks: usize,
    /// Most subtasks kept
    pub max_subtasks: usize,
    /// Estimate used when nothing better is known
    pub default_estimate_minutes: u32,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: 2048,
            temperature: 0.4,
            candidate_limit: 20,
            history_limit: 10,
            min_subtasks: 3,
            max_subtasks: 7,
            default_estimate_minutes: 60,
        }
    }
}

/// What `enrich` hands back to the caller.
#[derive(Debug, Clone)]
pub struct EnrichmentResult {
    /// Identifier of the cached (and possibly stored) proposal
    pub proposal_id: ProposalId,
    /// The proposal
    pub proposal: EnrichmentProposal,
    /// Similar tasks used as grounding
    pub similar_tasks: Vec<SimilarTaskMatch>,
    /// Insight block
    pub insights: EnrichmentInsights,
}

/// Result of a duration-only estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationEstimate {
    /// Estimated minutes
    pub minutes: u32,
    /// Model confidence; low when the baseline was used
    pub confidence: Confidence,
}

#[derive(Debug, Deserialize)]
struct GeneratedProposal {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, alias = "estimatedMinutes", deserialize_with = "lenient_minutes")]
    estimated_minutes: Option<f64>,
    #[serde(default, alias = "dueDate", alias = "suggestedDueDate")]
    due_date: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    confidence: Option<String>,
    #[serde(default, alias = "riskFactors", deserialize_with = "lenient_list")]
    risk_factors: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    subtasks: Vec<GeneratedSubtask>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSubtask {
    title: String,
    #[serde(default, alias = "estimatedMinutes", deserialize_with = "lenient_minutes")]
    estimated_minutes: Option<f64>,
    #[serde(default, rename = "type")]
    subtask_type: Option<String>,
    #[serde(default, alias = "aiCanDo", deserialize_with = "null_as_default")]
    ai_can_do: bool,
    #[serde(default)]
    order: Option<u32>,
}

/// `{"subtasks": [...]}` or a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SubtaskReply {
    Bare(Vec<Value>),
    Wrapped {
        #[serde(default, deserialize_with = "lenient_list")]
        subtasks: Vec<GeneratedSubtask>,
    },
}

impl SubtaskReply {
    fn into_subtasks(self) -> Vec<GeneratedSubtask> {
        match self {
            SubtaskReply::Bare(items) => items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
            SubtaskReply::Wrapped { subtasks } => subtasks,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EstimateReply {
    #[serde(default, alias = "estimatedMinutes", alias = "minutes", deserialize_with = "lenient_minutes")]
    estimated_minutes: Option<f64>,
    #[serde(default)]
    confidence: Option<String>,
}

/// Accept minutes as a number or a numeric string.
fn lenient_minutes<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<f64>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Proposal plus everything gathered to build it.
struct Generated {
    proposal: EnrichmentProposal,
    analysis: SimilarityAnalysis,
    metadata: AiCallMetadata,
}

/// Composes similarity search, history and generation into proposals.
#[derive(Clone)]
pub struct Enricher {
    tasks: Arc<dyn TaskStore>,
    history: Arc<dyn HistoryStore>,
    proposals: Arc<dyn ProposalStore>,
    model: Arc<dyn ChatModel>,
    usage: Arc<dyn UsageTracker>,
    cache: Arc<dyn ProposalCache>,
    finder: SimilarityFinder,
    config: EnrichmentConfig,
}

impl Enricher {
    /// Create an enricher over one backend implementing all three stores.
    pub fn new<S>(storage: Arc<S>, model: Arc<dyn ChatModel>, usage: Arc<dyn UsageTracker>) -> Self
    where
        S: TaskStore + HistoryStore + ProposalStore + 'static,
    {
        let tasks: Arc<dyn TaskStore> = storage.clone();
        let history: Arc<dyn HistoryStore> = storage.clone();
        let finder = SimilarityFinder::new(
            CandidateRetriever::new(tasks.clone(), history.clone()),
            SimilarityScorer::new(model.clone(), usage.clone()),
        );

        Self {
            tasks,
            history,
            proposals: storage,
            model,
            usage,
            cache: Arc::new(InMemoryProposalCache::new()),
            finder,
            config: EnrichmentConfig::default(),
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: EnrichmentConfig) -> Self {
        self.finder = self.finder.with_candidate_limit(config.candidate_limit);
        self.config = config;
        self
    }

    /// Set the similarity scorer configuration.
    pub fn with_scorer_config(mut self, config: ScorerConfig) -> Self {
        self.finder = SimilarityFinder::new(
            CandidateRetriever::new(self.tasks.clone(), self.history.clone()),
            SimilarityScorer::new(self.model.clone(), self.usage.clone()).with_config(config),
        )
        .with_candidate_limit(self.config.candidate_limit);
        self
    }

    /// Use a shared proposal cache.
    pub fn with_cache(mut self, cache: Arc<dyn ProposalCache>) -> Self {
        self.cache = cache;
        self
    }

    /// The proposal cache, for wiring an applier to the same instance.
    pub fn cache(&self) -> Arc<dyn ProposalCache> {
        self.cache.clone()
    }

    /// Enrich a task that may not exist yet.
    ///
    /// Never fails: every model or lookup problem degrades to a fallback and
    /// is listed in `insights.risk_factors`.
    pub async fn enrich(&self, user_id: &UserId, descriptor: &TaskDescriptor) -> EnrichmentResult {
        let generated = self.generate(user_id, descriptor).await;
        let proposal_id = self
            .cache
            .put(
                user_id.clone(),
                generated.proposal.clone(),
                generated.analysis.clone(),
                generated.metadata,
            )
            .await;

        info!("Cached proposal {} for '{}'", proposal_id, descriptor.title);
        EnrichmentResult {
            proposal_id,
            proposal: generated.proposal,
            similar_tasks: generated.analysis.similar_tasks,
            insights: generated.analysis.insights,
        }
    }

    /// Enrich a stored task and persist the proposal against it.
    pub async fn enrich_task(&self, user_id: &UserId, task_id: TaskId) -> Result<EnrichmentResult> {
        let task = self
            .tasks
            .get_task(task_id)
            .await?
            .filter(|t| !t.is_deleted())
            .ok_or(EnrichmentError::TaskNotFound(task_id))?;
        if !task.is_owned_by(user_id) {
            return Err(EnrichmentError::Unauthorized(format!("Task {}", task_id)));
        }

        let result = self.enrich(user_id, &TaskDescriptor::from(&task)).await;
        let metadata = self
            .cache
            .get(result.proposal_id)
            .await
            .map(|cached| cached.metadata)
            .unwrap_or_default();
        self.proposals
            .insert_proposal(&ProposalRecord::pending(
                result.proposal_id,
                user_id.clone(),
                Some(task_id),
                result.proposal.clone(),
                metadata,
            ))
            .await?;

        info!("Stored proposal {} for task {}", result.proposal_id, task_id);
        Ok(result)
    }

    /// Decompose a task into subtasks; empty when the model fails.
    pub async fn generate_subtasks(
        &self,
        user_id: &UserId,
        descriptor: &TaskDescriptor,
    ) -> Vec<ProposedSubtask> {
        let prompt = prompts::subtasks_prompt(descriptor, self.subtask_bounds());
        let response = match self
            .call(user_id, prompts::SUBTASKS_SYSTEM_PROMPT, prompt, SUBTASKS_FEATURE)
            .await
        {
            Ok((response, _)) => response,
            Err(e) => {
                warn!("Subtask generation failed: {}", e);
                return Vec::new();
            }
        };

        match extract_json::<SubtaskReply>(&response.content) {
            Some(reply) => self.normalize_subtasks(reply.into_subtasks()),
            None => {
                warn!("Subtask generation reply was not valid JSON");
                Vec::new()
            }
        }
    }

    /// Estimate duration, grounded on a subtask baseline and past ratios.
    ///
    /// Falls back to the baseline (or the default estimate when the baseline
    /// is zero) when the model gives nothing usable.
    pub async fn estimate_duration(
        &self,
        user_id: &UserId,
        descriptor: &TaskDescriptor,
        subtask_minutes: u32,
        historical_ratios: &[f64],
    ) -> DurationEstimate {
        let baseline = DurationEstimate {
            minutes: if subtask_minutes > 0 {
                subtask_minutes
            } else {
                self.config.default_estimate_minutes
            },
            confidence: Confidence::Low,
        };

        let prompt = prompts::estimate_prompt(descriptor, subtask_minutes, historical_ratios);
        let response = match self
            .call(user_id, prompts::ESTIMATE_SYSTEM_PROMPT, prompt, ESTIMATE_FEATURE)
            .await
        {
            Ok((response, _)) => response,
            Err(e) => {
                warn!("Duration estimate failed, using baseline: {}", e);
                return baseline;
            }
        };

        let parsed = extract_json::<EstimateReply>(&response.content);
        match parsed.as_ref().and_then(|r| positive_minutes(r.estimated_minutes)) {
            Some(minutes) => DurationEstimate {
                minutes,
                confidence: parsed
                    .and_then(|r| r.confidence)
                    .and_then(|c| c.parse().ok())
                    .unwrap_or_default(),
            },
            None => {
                warn!("Duration estimate reply unusable, using baseline");
                baseline
            }
        }
    }

    async fn generate(&self, user_id: &UserId, descriptor: &TaskDescriptor) -> Generated {
        let mut risk_factors = Vec::new();

        // 1. Similar tasks
        let (matches, aggregated) = match self.finder.find(user_id, descriptor).await {
            Ok(found) => {
                if found.degraded {
                    risk_factors.push(
                        "Similarity scoring unavailable; similar tasks matched by keywords only"
                            .to_string(),
                    );
                }
                (found.matches, found.insights)
            }
            Err(e) => {
                warn!("Similar task lookup failed: {}", e);
                risk_factors.push("Similar task lookup failed; no history used".to_string());
                (Vec::new(), AggregatedInsights::default())
            }
        };

        // 2. Historical accuracy for the matches
        let history = self.history_for(user_id, &matches, &mut risk_factors).await;

        // 3-4. Context and generation call
        let prompt = prompts::enrichment_prompt(
            descriptor,
            &matches,
            &aggregated,
            &history,
            self.subtask_bounds(),
        );
        let called = self
            .call(user_id, prompts::ENRICHMENT_SYSTEM_PROMPT, prompt, ENRICHMENT_FEATURE)
            .await;

        // 5. Defensive parse
        let (proposal, confidence, metadata) = match called {
            Ok((response, latency_ms)) => {
                let metadata = call_metadata(&response, latency_ms);
                match extract_json::<GeneratedProposal>(&response.content) {
                    Some(generated) => {
                        let (proposal, confidence) =
                            self.build_proposal(descriptor, generated, &mut risk_factors);
                        (proposal, confidence, metadata)
                    }
                    None => {
                        warn!("Enrichment reply was not valid JSON, using defaults");
                        risk_factors.push(
                            "AI response could not be parsed; showing default values".to_string(),
                        );
                        (self.minimal_proposal(), Confidence::Low, metadata)
                    }
                }
            }
            Err(e) => {
                warn!("Enrichment call failed, using defaults: {}", e);
                risk_factors.push(format!("AI suggestion unavailable: {}", e));
                let metadata = AiCallMetadata {
                    model: self.config.model.clone().unwrap_or_default(),
                    ..Default::default()
                };
                (self.minimal_proposal(), Confidence::Low, metadata)
            }
        };

        // 6. Success probability
        let success_probability = success_probability(matches.len(), &aggregated, confidence);
        debug!(
            "Enrichment for '{}': {} similar, confidence {:?}, success {}%",
            descriptor.title,
            matches.len(),
            confidence,
            success_probability
        );

        Generated {
            proposal,
            analysis: SimilarityAnalysis {
                insights: EnrichmentInsights {
                    similar_task_count: matches.len(),
                    aggregated,
                    confidence,
                    success_probability,
                    risk_factors,
                },
                similar_tasks: matches,
            },
            metadata,
        }
    }

    async fn history_for(
        &self,
        user_id: &UserId,
        matches: &[SimilarTaskMatch],
        risk_factors: &mut Vec<String>,
    ) -> Vec<ExecutionHistoryRecord> {
        if matches.is_empty() {
            return Vec::new();
        }
        let ids: Vec<TaskId> = matches
            .iter()
            .take(self.config.history_limit)
            .map(|m| m.task_id)
            .collect();

        match self.history.find_by_task_ids(user_id, &ids).await {
            Ok(mut records) => {
                records.truncate(self.config.history_limit);
                records
            }
            Err(e) => {
                warn!("History lookup failed: {}", e);
                risk_factors.push("Historical accuracy data unavailable".to_string());
                Vec::new()
            }
        }
    }

    fn build_proposal(
        &self,
        descriptor: &TaskDescriptor,
        generated: GeneratedProposal,
        risk_factors: &mut Vec<String>,
    ) -> (EnrichmentProposal, Confidence) {
        let subtasks = self.normalize_subtasks(generated.subtasks);
        if subtasks.len() < self.config.min_subtasks {
            risk_factors.push(format!(
                "Only {} subtasks proposed; the plan may be incomplete",
                subtasks.len()
            ));
        }

        let subtask_total: u32 = subtasks.iter().map(|s| s.estimated_minutes).sum();
        let estimated_minutes = positive_minutes(generated.estimated_minutes)
            .or((subtask_total > 0).then_some(subtask_total))
            .unwrap_or(self.config.default_estimate_minutes);

        let priority = generated
            .priority
            .and_then(|p| p.parse::<Priority>().ok())
            .unwrap_or_default();
        let due_date = generated
            .due_date
            .as_deref()
            .and_then(parse_due_date)
            .unwrap_or_else(|| {
                suggest_due_date(estimated_minutes, priority, Local::now()).with_timezone(&Utc)
            });

        let title = generated
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| descriptor.title.clone());
        let description = generated
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .or_else(|| descriptor.description.clone())
            .unwrap_or_default();

        risk_factors.extend(
            generated
                .risk_factors
                .into_iter()
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty()),
        );

        let confidence = generated
            .confidence
            .and_then(|c| c.parse().ok())
            .unwrap_or_default();

        (
            EnrichmentProposal {
                title,
                description,
                due_date: Some(due_date),
                estimated_minutes,
                priority,
                subtasks,
            },
            confidence,
        )
    }

    /// Drop untitled entries, order by the suggested position, cap and renumber.
    fn normalize_subtasks(&self, generated: Vec<GeneratedSubtask>) -> Vec<ProposedSubtask> {
        let mut indexed: Vec<(u32, usize, GeneratedSubtask)> = generated
            .into_iter()
            .enumerate()
            .filter(|(_, s)| !s.title.trim().is_empty())
            .map(|(i, s)| (s.order.unwrap_or(u32::MAX), i, s))
            .collect();
        indexed.sort_by_key(|(order, position, _)| (*order, *position));

        indexed
            .into_iter()
            .take(self.config.max_subtasks)
            .enumerate()
            .map(|(i, (_, _, s))| ProposedSubtask {
                title: s.title.trim().to_string(),
                estimated_minutes: positive_minutes(s.estimated_minutes)
                    .unwrap_or(DEFAULT_SUBTASK_MINUTES),
                subtask_type: s
                    .subtask_type
                    .and_then(|t| t.parse::<SubtaskType>().ok())
                    .unwrap_or_default(),
                ai_can_do: s.ai_can_do,
                order: i as u32 + 1,
            })
            .collect()
    }

    fn minimal_proposal(&self) -> EnrichmentProposal {
        EnrichmentProposal::minimal(self.config.default_estimate_minutes)
    }

    fn subtask_bounds(&self) -> (usize, usize) {
        (self.config.min_subtasks, self.config.max_subtasks)
    }

    /// One model call; usage is tracked whenever the provider answered.
    async fn call(
        &self,
        user_id: &UserId,
        system_prompt: &str,
        prompt: String,
        feature: &str,
    ) -> std::result::Result<(ChatResponse, u64), ModelError> {
        let request = ChatRequest::new(user_id.clone(), system_prompt, prompt)
            .with_model(self.config.model.clone())
            .with_sampling(self.config.max_tokens, self.config.temperature);

        let started = Instant::now();
        let response = self.model.chat(request).await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        self.usage
            .track_usage(UsageEvent {
                user_id: user_id.clone(),
                provider: response.provider.clone(),
                model: response.model.clone(),
                feature: feature.to_string(),
                input_tokens: response.usage.input_tokens,
                output_tokens: response.usage.output_tokens,
            })
            .await;

        Ok((response, latency_ms))
    }
}

fn call_metadata(response: &ChatResponse, latency_ms: u64) -> AiCallMetadata {
    AiCallMetadata {
        model: response.model.clone(),
        provider: response.provider.clone(),
        input_tokens: response.usage.input_tokens,
        output_tokens: response.usage.output_tokens,
        latency_ms,
    }
}

fn positive_minutes(minutes: Option<f64>) -> Option<u32> {
    minutes
        .filter(|m| m.is_finite() && *m >= 1.0)
        .map(|m| m.round().min(u32::MAX as f64) as u32)
}

/// RFC 3339, a naive timestamp (read as UTC), or a bare date at 17:00 local.
fn parse_due_date(raw: &str) -> Option<Time> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    Local
        .from_local_datetime(&date.and_hms_opt(17, 0, 0)?)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Chance of success in percent.
///
/// History drives the base when there is any; otherwise the model's own
/// confidence does. High confidence adds up to 10 (capped at 95), low
/// confidence takes off up to 15 (floored at 30).
pub fn success_probability(
    similar_task_count: usize,
    aggregated: &AggregatedInsights,
    confidence: Confidence,
) -> u8 {
    let base: i32 = if similar_task_count > 0 {
        aggregated.success_rate as i32
    } else {
        match confidence {
            Confidence::High => 80,
            Confidence::Medium => 65,
            Confidence::Low => 50,
        }
    };

    let adjusted = match confidence {
        Confidence::High => (base + 10).min(95),
        Confidence::Medium => base,
        Confidence::Low => (base - 15).max(30),
    };
    adjusted.clamp(0, 100) as u8
}
