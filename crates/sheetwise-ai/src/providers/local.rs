//! Offline provider for running without an API key

use crate::bridge::{CompletionProvider, CompletionRequest, CompletionResult, MessageRole};
use crate::error::CompletionError;

/// Answers every request locally with a fixed notice and reports zero usage.
#[derive(Debug, Clone, Default)]
pub struct OfflineProvider;

impl OfflineProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl CompletionProvider for OfflineProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResult, CompletionError> {
        let question = request
            .messages
            .iter()
            .rev()
            .find(|message| message.role == MessageRole::User)
            .and_then(|message| message.content.rsplit_once("Question: "))
            .map(|(_, question)| question.trim())
            .unwrap_or_default();

        let text = format!(
            "Offline mode is enabled, so no language model was consulted for \"{}\". \
             Configure SHEETWISE_PROVIDER=openai and an API key to get a real analysis.",
            question
        );

        Ok(CompletionResult {
            text,
            tokens_used: 0,
            model: None,
        })
    }

    fn name(&self) -> &str {
        "local"
    }
}
