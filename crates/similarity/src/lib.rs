//! Similar-task search.
//!
//! Keyword retrieval over the user's completed tasks, semantic scoring by a
//! chat model, and aggregation of the matches' execution history.

#![warn(missing_docs)]

pub mod finder;
pub mod insights;
pub mod keywords;
pub mod retriever;
pub mod scorer;

pub use finder::{SimilarTasks, SimilarityFinder};
pub use insights::aggregate;
pub use keywords::{extract_keywords, MAX_KEYWORDS};
pub use retriever::{Candidate, CandidateRetriever, DEFAULT_CANDIDATE_LIMIT};
pub use scorer::{ScoredMatches, ScorerConfig, SimilarityScorer, FALLBACK_REASON, SCORING_FEATURE};
