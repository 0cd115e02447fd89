//! Prompt templates for dataset analysis

use sheetwise_core::{ActionType, AnalysisRequest, ChatRole};

use crate::bridge::{ChatMessage, CompletionRequest};
use crate::config::AnalysisConfig;

/// Standing instruction sent with every analysis and chat call.
pub const VISUALIZATION_SYSTEM_PROMPT: &str = r#"You are a data analyst helping a user understand a spreadsheet they uploaded.

Answer the user's question using only the data provided. Be concise, cite concrete figures, and point out trends, outliers, and data quality issues when they matter to the question.

When a chart would make the answer clearer, include exactly one chart as a fenced ```json code block with this shape:

```json
{
  "type": "bar",
  "data": {
    "labels": ["Label 1", "Label 2"],
    "datasets": [
      {"label": "Series name", "data": [10, 20]}
    ]
  },
  "options": {}
}
```

Choose the chart type from the question and the data:
- bar: comparing values across categories
- line: trends over time or another ordered dimension
- pie or doughnut: parts of a whole
- scatter: correlation between two numeric columns, with data points written as {"x": ..., "y": ...}

Use only numbers in "data" and keep labels short. Do not include a chart when it would not add information."#;

/// Builds completion requests from analysis requests.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptBuilder {
    model: String,
    max_rows: usize,
    max_tokens: u32,
    temperature: f32,
}

impl PromptBuilder {
    pub fn new(model: impl Into<String>) -> Self {
        let defaults = AnalysisConfig::default();
        Self {
            model: model.into(),
            max_rows: defaults.max_rows,
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            model: config.model.clone(),
            max_rows: config.max_rows,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows.max(1);
        self
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    /// Assemble the system instruction, any prior chat turns, and the
    /// dataset-bearing user message.
    pub fn build(&self, request: &AnalysisRequest) -> Result<CompletionRequest, serde_json::Error> {
        let mut messages = vec![ChatMessage::system(VISUALIZATION_SYSTEM_PROMPT)];

        if request.action == ActionType::Chat {
            messages.extend(request.history.iter().map(|turn| match turn.role {
                ChatRole::User => ChatMessage::user(turn.content.clone()),
                ChatRole::Assistant => ChatMessage::assistant(turn.content.clone()),
            }));
        }

        messages.push(ChatMessage::user(self.dataset_message(request)?));

        Ok(CompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        })
    }

    fn dataset_message(&self, request: &AnalysisRequest) -> Result<String, serde_json::Error> {
        let dataset = &request.dataset;
        let rows = dataset.head(self.max_rows);
        let sample = serde_json::to_string_pretty(rows)?;

        let sample_note = if rows.len() < dataset.len() {
            format!("First {} of {} rows", rows.len(), dataset.len())
        } else {
            format!("All {} rows", dataset.len())
        };

        Ok(format!(
            r#"Dataset: {}
Columns: {}
Total rows: {}

{}:
```json
{}
```

Question: {}"#,
            request.dataset_name.as_deref().unwrap_or("uploaded dataset"),
            dataset.columns().join(", "),
            dataset.len(),
            sample_note,
            sample,
            request.question.trim()
        ))
    }
}
