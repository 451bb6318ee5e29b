//! Ollama chat client.
//!
//! Talks to Ollama's `/api/chat` endpoint with streaming disabled.

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::chat::{ChatMessage, ChatModel, ChatRequest, ChatResponse, ModelError, TokenUsage};

/// Ollama connection settings.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Server URL
    pub url: String,
    /// Default model
    pub model: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434".to_string(),
            model: "qwen3:4b".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Ollama Chat Client.
#[derive(Clone)]
pub struct OllamaChatClient {
    /// HTTP client
    client: Client,

    /// Connection settings
    config: OllamaConfig,
}

impl OllamaChatClient {
    /// Create a new Ollama chat client.
    pub fn new(config: OllamaConfig) -> Self {
        Self {
            client: ClientBuilder::new()
                .timeout(config.timeout)
                .build()
                .unwrap_or_default(),
            config,
        }
    }

    /// Check Ollama health.
    pub async fn health_check(&self) -> bool {
        self.client
            .get(format!("{}/api/version", self.config.url))
            .send()
            .await
            .is_ok_and(|r| r.status().is_success())
    }
}

#[async_trait]
impl ChatModel for OllamaChatClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ModelError> {
        let model = request.model.clone().unwrap_or_else(|| self.config.model.clone());

        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system_prompt {
            messages.push(ChatMessage::system(system.clone()));
        }
        messages.extend(request.messages.iter().cloned());

        let mut payload = json!({
            "model": model,
            "messages": messages,
            "stream": false,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            }
        });
        if request.json_mode {
            payload["format"] = json!("json");
        }

        debug!("Calling Ollama chat ({} messages, model {})", messages.len(), model);

        let response = self
            .client
            .post(format!("{}/api/chat", self.config.url))
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api { status, body });
        }

        #[derive(serde::Deserialize)]
        struct Response {
            model: Option<String>,
            message: Option<Message>,
            #[serde(default)]
            prompt_eval_count: u32,
            #[serde(default)]
            eval_count: u32,
        }

        #[derive(serde::Deserialize)]
        struct Message {
            content: String,
        }

        let data: Response = response.json().await?;
        let content = data
            .message
            .map(|m| m.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(ModelError::EmptyResponse)?;

        Ok(ChatResponse {
            content,
            usage: TokenUsage {
                input_tokens: data.prompt_eval_count,
                output_tokens: data.eval_count,
            },
            model: data.model.unwrap_or(model),
            provider: "ollama".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_server_is_unhealthy() {
        // Port 9 (discard) is not served locally; the connection is refused
        let client = OllamaChatClient::new(OllamaConfig {
            url: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_secs(2),
            ..Default::default()
        });
        assert!(!client.health_check().await);
    }
}
