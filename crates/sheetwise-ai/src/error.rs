//! Error taxonomy for the analysis pipeline

use std::fmt;

use serde::{Deserialize, Serialize};
use sheetwise_core::{LedgerError, UserId};

/// Longest raw-body excerpt carried in a protocol error.
pub const SNIPPET_LIMIT: usize = 500;

/// Why a provider response could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolFailure {
    /// An HTML page, typically a gateway error page
    Html,
    /// Body is not valid JSON
    MalformedJson,
    /// Valid JSON without `choices[0].message.content`
    MissingContent,
}

impl fmt::Display for ProtocolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProtocolFailure::Html => "HTML page instead of JSON",
            ProtocolFailure::MalformedJson => "malformed JSON",
            ProtocolFailure::MissingContent => "missing completion content",
        })
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CompletionError {
    /// Missing credential or unusable client settings
    #[error("completion provider misconfigured: {0}")]
    Config(String),

    /// Connection failure or timeout
    #[error("transport error: {message}")]
    Transport { message: String, timed_out: bool },

    /// Response could not be decoded
    #[error("protocol error (HTTP {status}, {kind}): {snippet}")]
    Protocol { kind: ProtocolFailure, status: u16, snippet: String },

    /// Provider returned an error payload or a non-success status
    #[error("upstream error (HTTP {status}): {message}")]
    Upstream { status: u16, message: String },
}

impl CompletionError {
    /// Only transport failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, CompletionError::Transport { .. })
    }

    pub fn protocol(kind: ProtocolFailure, status: u16, body: &str) -> Self {
        CompletionError::Protocol {
            kind,
            status,
            snippet: truncate(body, SNIPPET_LIMIT),
        }
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(e: reqwest::Error) -> Self {
        CompletionError::Transport {
            timed_out: e.is_timeout(),
            message: e.to_string(),
        }
    }
}

/// Truncate to at most `limit` characters, marking the cut.
pub fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

/// Machine-readable failure category returned to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    InsufficientQuota,
    NotFound,
    Config,
    Transport,
    Protocol,
    Upstream,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::InsufficientQuota => "insufficient_quota",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Config => "config",
            ErrorKind::Transport => "transport",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Upstream => "upstream",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AnalysisError {
    /// Bad input, correctable by the user
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("insufficient quota: {available} tokens available")]
    InsufficientQuota { available: u64 },

    /// The prompt alone is expected to cost more than the remaining balance
    #[error("estimated cost of {estimate} tokens exceeds the {available} available")]
    EstimateExceedsBalance { estimate: u64, available: u64 },

    #[error("no token account for user {0}")]
    AccountNotFound(UserId),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<LedgerError> for AnalysisError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::NotFound(user_id) => AnalysisError::AccountNotFound(user_id),
            LedgerError::InsufficientQuota { available, .. } => AnalysisError::InsufficientQuota { available },
            other => AnalysisError::Internal(other.to_string()),
        }
    }
}

impl AnalysisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalysisError::Validation(_) => ErrorKind::Validation,
            AnalysisError::InsufficientQuota { .. } | AnalysisError::EstimateExceedsBalance { .. } => {
                ErrorKind::InsufficientQuota
            }
            AnalysisError::AccountNotFound(_) => ErrorKind::NotFound,
            AnalysisError::Completion(e) => match e {
                CompletionError::Config(_) => ErrorKind::Config,
                CompletionError::Transport { .. } => ErrorKind::Transport,
                CompletionError::Protocol { .. } => ErrorKind::Protocol,
                CompletionError::Upstream { .. } => ErrorKind::Upstream,
            },
            AnalysisError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns a user-safe message, without raw provider bodies or internals
    pub fn user_message(&self) -> String {
        match self {
            AnalysisError::Validation(message) => message.clone(),
            AnalysisError::InsufficientQuota { .. } => {
                "You have no analysis tokens left. Upgrade your plan or purchase a token pack to continue.".to_string()
            }
            AnalysisError::EstimateExceedsBalance { available, .. } => format!(
                "The estimated cost of this request exceeds your remaining {available} tokens. \
                 Try a smaller dataset or upgrade your plan."
            ),
            AnalysisError::AccountNotFound(_) => "No token account exists for this user.".to_string(),
            AnalysisError::Completion(e) => match e {
                CompletionError::Config(_) => "The analysis service is not configured. Please contact support.".to_string(),
                CompletionError::Transport { timed_out: true, .. } => {
                    "The AI service took too long to respond. Please try again with a smaller dataset or a simpler question."
                        .to_string()
                }
                CompletionError::Transport { .. } => "Could not reach the AI service. Please try again shortly.".to_string(),
                CompletionError::Protocol { .. } => {
                    "The AI service returned an unexpected response. Please try again later.".to_string()
                }
                CompletionError::Upstream { message, .. } => {
                    format!("The AI service reported an error: {}", truncate(message, 200))
                }
            },
            AnalysisError::Internal(_) => "An internal error occurred. Please try again.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdef", 3), "abc…");
        assert_eq!(truncate("ééééé", 2), "éé…");
    }

    #[test]
    fn test_protocol_snippet_is_bounded() {
        let body = "x".repeat(2000);
        let CompletionError::Protocol { snippet, .. } = CompletionError::protocol(ProtocolFailure::MalformedJson, 200, &body)
        else {
            panic!("expected protocol error");
        };
        assert_eq!(snippet.chars().count(), SNIPPET_LIMIT + 1);
    }

    #[test]
    fn test_only_transport_is_transient() {
        assert!(CompletionError::Transport { message: "reset".into(), timed_out: false }.is_transient());
        assert!(!CompletionError::Upstream { status: 500, message: "boom".into() }.is_transient());
        assert!(!CompletionError::protocol(ProtocolFailure::Html, 502, "<html>").is_transient());
        assert!(!CompletionError::Config("no key".into()).is_transient());
    }

    #[test]
    fn test_ledger_errors_map_to_kinds() {
        let e = AnalysisError::from(LedgerError::NotFound(UserId(3)));
        assert_eq!(e.kind(), ErrorKind::NotFound);
        let e = AnalysisError::from(LedgerError::InsufficientQuota { requested: 5, available: 1 });
        assert_eq!(e.kind(), ErrorKind::InsufficientQuota);
        let e = AnalysisError::from(LedgerError::AlreadyExists(UserId(3)));
        assert_eq!(e.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_user_message_hides_protocol_body() {
        let e = AnalysisError::from(CompletionError::protocol(
            ProtocolFailure::Html,
            502,
            "<html><body>nginx secret-host-17</body></html>",
        ));
        assert_eq!(e.kind(), ErrorKind::Protocol);
        assert!(!e.user_message().contains("secret-host-17"));
    }
}
