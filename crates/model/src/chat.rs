//! Chat interface to a generative text model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use taskwise_core::UserId;

/// Errors from a model call.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider answered with a non-success status
    #[error("Model API error (status {status}): {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// Provider answered without content
    #[error("Model response had no content")]
    EmptyResponse,

    /// No model is reachable
    #[error("Model unavailable: {0}")]
    Unavailable(String),
}

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions
    System,
    /// End user
    User,
    /// Model
    Assistant,
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Speaker
    pub role: Role,
    /// Text
    pub content: String,
}

impl ChatMessage {
    /// User message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// System message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// One chat call.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Conversation
    pub messages: Vec<ChatMessage>,
    /// System prompt, sent ahead of the messages
    pub system_prompt: Option<String>,
    /// Model override; providers fall back to their default
    pub model: Option<String>,
    /// Output token cap
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Requesting user, for usage attribution
    pub user_id: UserId,
    /// Ask the provider for JSON output where supported
    pub json_mode: bool,
}

impl ChatRequest {
    /// Single-turn request with a system prompt.
    pub fn new(user_id: UserId, system_prompt: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::user(prompt)],
            system_prompt: Some(system_prompt.into()),
            model: None,
            max_tokens: 1024,
            temperature: 0.3,
            user_id,
            json_mode: true,
        }
    }

    /// Override the model.
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    /// Set the sampling parameters.
    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }
}

/// Token accounting for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens
    pub input_tokens: u32,
    /// Completion tokens
    pub output_tokens: u32,
}

/// Result of a chat call.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    /// Generated text
    pub content: String,
    /// Token accounting
    pub usage: TokenUsage,
    /// Model that answered
    pub model: String,
    /// Provider name
    pub provider: String,
}

/// A generative text model.
///
/// Treated as opaque: callers only rely on getting text back, which may or
/// may not parse as the JSON they asked for.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Run one chat call.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ModelError>;
}
