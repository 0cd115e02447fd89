//! Chat-completion bridge between the pipeline and an LLM backend

use serde::{Deserialize, Serialize};

use crate::error::CompletionError;

/// Role of a chat message on the provider wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: MessageRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: MessageRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Assistant, content: content.into() }
    }
}

/// Request body sent to the chat-completions endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    /// Total characters across all messages.
    pub fn prompt_chars(&self) -> usize {
        self.messages.iter().map(|m| m.content.chars().count()).sum()
    }
}

/// Successful completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResult {
    /// Markdown answer, possibly with fenced code blocks
    pub text: String,
    /// Total tokens the provider reports as consumed
    pub tokens_used: u64,
    /// Model that served the request, when reported
    pub model: Option<String>,
}

/// LLM backend that can answer a chat-completion request.
#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResult, CompletionError>;

    /// Get provider name
    fn name(&self) -> &str;
}
