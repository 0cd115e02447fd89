//! Analysis pipeline configuration, read from the environment

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use sheetwise_core::config::{duration_millis, duration_secs, figment, optional_string};

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Which completion backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum ProviderKind {
    /// OpenAI-compatible chat-completions endpoint
    #[default]
    OpenAi,
    /// Offline stand-in that never leaves the process
    Local,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "local" | "offline" => Ok(ProviderKind::Local),
            other => Err(format!("unknown provider '{other}', expected 'openai' or 'local'")),
        }
    }
}

impl TryFrom<String> for ProviderKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Pipeline settings, one `SHEETWISE_*` variable per field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub provider: ProviderKind,
    /// Full URL of the chat-completions endpoint
    pub api_url: String,
    /// `SHEETWISE_API_KEY`, falling back to `OPENAI_API_KEY`
    #[serde(deserialize_with = "optional_string")]
    pub api_key: Option<String>,
    pub model: String,
    /// Upper bound on a single provider call
    #[serde(rename = "timeout_secs", deserialize_with = "duration_secs")]
    pub timeout: Duration,
    /// Rows of the dataset included in the prompt
    pub max_rows: usize,
    /// `max_tokens` sent to the provider
    pub max_tokens: u32,
    pub temperature: f32,
    /// Extra attempts after a transport failure
    pub max_retries: u32,
    /// First retry delay; doubles on each further attempt
    #[serde(rename = "retry_base_ms", deserialize_with = "duration_millis")]
    pub retry_base_delay: Duration,
    /// Reject up front when the estimated prompt cost exceeds the balance
    pub estimate_precheck: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenAi,
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(90),
            max_rows: 100,
            max_tokens: 2000,
            temperature: 0.7,
            max_retries: 2,
            retry_base_delay: Duration::from_millis(500),
            estimate_precheck: false,
        }
    }
}

impl AnalysisConfig {
    #[allow(clippy::result_large_err)]
    pub fn load() -> Result<Self, figment::Error> {
        let config: Self = figment().extract()?;
        config.validate().map_err(figment::Error::from)?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(format!("SHEETWISE_TEMPERATURE must be between 0 and 2, got {}", self.temperature));
        }
        if self.max_rows == 0 {
            return Err("SHEETWISE_MAX_ROWS must be at least 1".to_string());
        }
        Ok(())
    }
}
