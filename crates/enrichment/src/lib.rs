//! Task enrichment.
//!
//! Builds AI proposals for tasks from similar past work, caches them until
//! the task exists, and commits the fields a user accepts.

#![warn(missing_docs)]

pub mod applier;
pub mod cache;
pub mod error;
pub mod orchestrator;
mod prompts;

pub use applier::EnrichmentApplier;
pub use cache::{CachedProposal, InMemoryProposalCache, ProposalCache, DEFAULT_PROPOSAL_TTL};
pub use error::{EnrichmentError, Result};
pub use orchestrator::{
    success_probability, DurationEstimate, Enricher, EnrichmentConfig, EnrichmentResult,
    ENRICHMENT_FEATURE, ESTIMATE_FEATURE, SUBTASKS_FEATURE,
};
