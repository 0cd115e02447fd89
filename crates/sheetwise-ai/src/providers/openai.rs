//! OpenAI-compatible chat-completions provider

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::bridge::{CompletionProvider, CompletionRequest, CompletionResult};
use crate::config::{AnalysisConfig, DEFAULT_API_URL};
use crate::error::{CompletionError, ProtocolFailure};

pub struct OpenAiProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

impl OpenAiProvider {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: DEFAULT_API_URL.to_string(),
            api_key,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Result<Self, CompletionError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CompletionError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    total_tokens: u64,
}

#[async_trait::async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResult, CompletionError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| CompletionError::Config("no API key configured".to_string()))?;

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(status, bytes = body.len(), model = %request.model, "Completion response received");

        decode_completion(status, &body)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Classify a raw chat-completions response.
pub fn decode_completion(status: u16, body: &str) -> Result<CompletionResult, CompletionError> {
    let success = (200..300).contains(&status);
    let trimmed = body.trim_start();

    if trimmed.starts_with('<') {
        return Err(CompletionError::protocol(ProtocolFailure::Html, status, body));
    }
    if trimmed.is_empty() && !success {
        return Err(CompletionError::Upstream {
            status,
            message: format!("provider returned HTTP {status} with an empty body"),
        });
    }

    let payload: Value = serde_json::from_str(body)
        .map_err(|_| CompletionError::protocol(ProtocolFailure::MalformedJson, status, body))?;

    if let Some(error) = payload.get("error").filter(|error| !error.is_null()) {
        return Err(CompletionError::Upstream {
            status,
            message: upstream_message(error),
        });
    }
    if !success {
        return Err(CompletionError::Upstream {
            status,
            message: format!("provider returned HTTP {status}"),
        });
    }

    let response: ChatCompletionResponse = serde_json::from_value(payload)
        .map_err(|_| CompletionError::protocol(ProtocolFailure::MissingContent, status, body))?;

    let text = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| CompletionError::protocol(ProtocolFailure::MissingContent, status, body))?;

    Ok(CompletionResult {
        text,
        tokens_used: response.usage.map(|usage| usage.total_tokens).unwrap_or(0),
        model: response.model,
    })
}

fn upstream_message(error: &Value) -> String {
    match error {
        Value::String(message) => message.clone(),
        Value::Object(fields) => fields
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}
