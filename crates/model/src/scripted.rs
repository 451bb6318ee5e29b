//! Deterministic model driven by a queue of canned replies.
//!
//! Used by tests and by the CLI's offline mode, where the empty queue makes
//! every call fail and exercises the fallbacks.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::chat::{ChatModel, ChatRequest, ChatResponse, ModelError, TokenUsage};

enum Reply {
    Text(String),
    Fail(String),
}

/// Model that replays scripted replies in order.
#[derive(Clone, Default)]
pub struct ScriptedModel {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl ScriptedModel {
    /// Model with no replies; every call fails as unavailable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply.
    pub fn reply(self, content: impl Into<String>) -> Self {
        self.push(Reply::Text(content.into()))
    }

    /// Queue a failing call.
    pub fn fail(self, message: impl Into<String>) -> Self {
        self.push(Reply::Fail(message.into()))
    }

    fn push(self, reply: Reply) -> Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
        self
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ModelError> {
        let prompt_chars: usize = request.messages.iter().map(|m| m.content.len()).sum();
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        let next = self.replies.lock().ok().and_then(|mut r| r.pop_front());
        match next {
            Some(Reply::Text(content)) => Ok(ChatResponse {
                usage: TokenUsage {
                    input_tokens: (prompt_chars / 4) as u32,
                    output_tokens: (content.len() / 4) as u32,
                },
                content,
                model: "scripted".to_string(),
                provider: "scripted".to_string(),
            }),
            Some(Reply::Fail(message)) => Err(ModelError::Unavailable(message)),
            None => Err(ModelError::Unavailable("no scripted reply".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskwise_core::UserId;

    #[tokio::test]
    async fn test_replies_in_order_then_fails() {
        let model = ScriptedModel::new().reply("first").fail("boom");
        let request = || ChatRequest::new(UserId::new("u1"), "system", "prompt");

        assert_eq!(model.chat(request()).await.unwrap().content, "first");
        assert!(matches!(model.chat(request()).await, Err(ModelError::Unavailable(m)) if m == "boom"));
        assert!(model.chat(request()).await.is_err());
        assert_eq!(model.requests().len(), 3);
    }
}
