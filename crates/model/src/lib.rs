//! Generative model access.
//!
//! A narrow chat interface, an Ollama client for it, usage tracking, and the
//! shared best-effort extraction of JSON from model text.

#![warn(missing_docs)]

pub mod chat;
pub mod ollama;
pub mod scripted;
pub mod structured;
pub mod usage;

pub use chat::{ChatMessage, ChatModel, ChatRequest, ChatResponse, ModelError, Role, TokenUsage};
pub use ollama::{OllamaChatClient, OllamaConfig};
pub use scripted::ScriptedModel;
pub use structured::{extract_json, lenient_list, null_as_default};
pub use usage::{InMemoryUsageTracker, TracingUsageTracker, UsageEvent, UsageTracker};
