//! Core data structures for an analysis request

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stable identifier for a user account, asserted by the web layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(UserId)
    }
}

/// What kind of call consumed the tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// First question asked against a freshly uploaded dataset.
    #[default]
    Analysis,
    /// Follow-up question in an ongoing conversation about the dataset.
    Chat,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Analysis => "analysis",
            ActionType::Chat => "chat",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Speaker of a prior conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One prior exchange replayed to the model on follow-up questions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

/// A single row: column name → scalar cell value, in column order.
pub type Record = serde_json::Map<String, Value>;

/// Row-oriented table produced by the upload normalizer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dataset {
    records: Vec<Record>,
}

impl Dataset {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The first `limit` rows, or all of them when the table is smaller.
    pub fn head(&self, limit: usize) -> &[Record] {
        &self.records[..self.records.len().min(limit)]
    }

    /// Column names in first-seen order across all rows.
    pub fn columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = Vec::new();
        for record in &self.records {
            for key in record.keys() {
                if !columns.contains(&key.as_str()) {
                    columns.push(key);
                }
            }
        }
        columns
    }

    /// Locate the first cell that is not a scalar (number, string, bool, null).
    ///
    /// Returns `(row_index, column_name)`.
    pub fn first_non_scalar(&self) -> Option<(usize, &str)> {
        self.records.iter().enumerate().find_map(|(row, record)| {
            record
                .iter()
                .find(|(_, value)| value.is_array() || value.is_object())
                .map(|(column, _)| (row, column.as_str()))
        })
    }
}

impl From<Vec<Record>> for Dataset {
    fn from(records: Vec<Record>) -> Self {
        Self::new(records)
    }
}

/// Ephemeral value describing one question against one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub user_id: UserId,
    pub question: String,
    pub dataset: Dataset,
    #[serde(default)]
    pub dataset_name: Option<String>,
    #[serde(default)]
    pub action: ActionType,
    /// Prior turns; only replayed for [`ActionType::Chat`].
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

impl AnalysisRequest {
    pub fn new(user_id: UserId, question: impl Into<String>, dataset: Dataset) -> Self {
        Self {
            user_id,
            question: question.into(),
            dataset,
            dataset_name: None,
            action: ActionType::Analysis,
            history: Vec::new(),
        }
    }

    pub fn with_dataset_name(mut self, name: impl Into<String>) -> Self {
        self.dataset_name = Some(name.into());
        self
    }

    pub fn as_chat(mut self, history: Vec<ChatTurn>) -> Self {
        self.action = ActionType::Chat;
        self.history = history;
        self
    }
}
