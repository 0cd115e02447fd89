//! API error responses

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use sheetwise_ai::{AnalysisError, AnalysisOutcome, CompletionError, ErrorKind};
use sheetwise_core::LedgerError;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    /// No usable `x-user-id` header
    #[error("missing or invalid user identity")]
    Unauthenticated,

    /// Admin token missing or wrong
    #[error("admin token rejected")]
    Forbidden,

    /// Admin endpoints called while no admin token is configured
    #[error("admin API is disabled")]
    AdminDisabled,

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden | ApiError::AdminDisabled => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Analysis(e) => match e {
                AnalysisError::Completion(CompletionError::Transport { timed_out: true, .. }) => {
                    StatusCode::GATEWAY_TIMEOUT
                }
                e => match e.kind() {
                    ErrorKind::Validation => StatusCode::BAD_REQUEST,
                    ErrorKind::InsufficientQuota => StatusCode::PAYMENT_REQUIRED,
                    ErrorKind::NotFound => StatusCode::NOT_FOUND,
                    ErrorKind::Config => StatusCode::SERVICE_UNAVAILABLE,
                    ErrorKind::Transport | ErrorKind::Protocol | ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
                    ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
                },
            },
            ApiError::Ledger(e) => match e {
                LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
                LedgerError::AlreadyExists(_) => StatusCode::CONFLICT,
                LedgerError::InsufficientQuota { .. } => StatusCode::PAYMENT_REQUIRED,
                LedgerError::Overflow { .. } => StatusCode::BAD_REQUEST,
            },
        }
    }

    /// Machine-readable error tag
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated => "unauthenticated",
            ApiError::Forbidden | ApiError::AdminDisabled => "forbidden",
            ApiError::BadRequest(_) => ErrorKind::Validation.as_str(),
            ApiError::Analysis(e) => e.kind().as_str(),
            ApiError::Ledger(e) => match e {
                LedgerError::NotFound(_) => ErrorKind::NotFound.as_str(),
                LedgerError::AlreadyExists(_) => "conflict",
                LedgerError::InsufficientQuota { .. } => ErrorKind::InsufficientQuota.as_str(),
                LedgerError::Overflow { .. } => ErrorKind::Validation.as_str(),
            },
        }
    }

    /// Returns a user-safe error message
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Unauthenticated => "Sign in to use the analysis service.".to_string(),
            ApiError::Forbidden => "Admin access denied.".to_string(),
            ApiError::AdminDisabled => "The admin API is disabled on this server.".to_string(),
            ApiError::BadRequest(message) => message.clone(),
            ApiError::Analysis(e) => e.user_message(),
            ApiError::Ledger(e) => match e {
                LedgerError::NotFound(user_id) => format!("No token account exists for user {user_id}."),
                other => other.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "Request failed: {}", self);
        } else {
            tracing::debug!(status = status.as_u16(), "Client error: {}", self);
        }

        match &self {
            ApiError::Analysis(e) => (status, Json(AnalysisOutcome::failure(e))).into_response(),
            _ => {
                let body = json!({
                    "success": false,
                    "message": self.user_message(),
                    "error": self.kind(),
                });
                (status, Json(body)).into_response()
            }
        }
    }
}
