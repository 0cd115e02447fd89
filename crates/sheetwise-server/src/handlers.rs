//! REST API handlers for the Sheetwise server

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::{Deserialize, Serialize};
use sheetwise_ai::AnalysisOutcome;
use sheetwise_core::{AccountSummary, ActionType, AnalysisRequest, ChatTurn, Dataset, UsageRecord, UserId};
use tracing::debug;

use crate::ServerState;
use crate::auth::{AdminAccess, CurrentUser};
use crate::error::ApiError;

const DEFAULT_USAGE_LIMIT: usize = 50;
const MAX_USAGE_LIMIT: usize = 500;

/// Deserializer detail stays in the logs; clients get a fixed message.
fn invalid_body(rejection: JsonRejection) -> ApiError {
    debug!(status = %rejection.status(), "Rejected request body: {}", rejection.body_text());
    ApiError::BadRequest("Request body is not valid.".to_string())
}

/// Body of `POST /api/analyze`
#[derive(Debug, Deserialize)]
pub struct AnalyzeBody {
    pub question: String,
    pub dataset: Dataset,
    #[serde(default)]
    pub dataset_name: Option<String>,
    #[serde(default)]
    pub action: ActionType,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

impl AnalyzeBody {
    fn into_request(self, user_id: UserId) -> AnalysisRequest {
        AnalysisRequest {
            user_id,
            question: self.question,
            dataset: self.dataset,
            dataset_name: self.dataset_name,
            action: self.action,
            history: self.history,
        }
    }
}

/// Analyze a dataset, or continue a chat about one
pub async fn analyze(
    State(state): State<Arc<ServerState>>,
    CurrentUser(user_id): CurrentUser,
    body: Result<Json<AnalyzeBody>, JsonRejection>,
) -> Result<Json<AnalysisOutcome>, ApiError> {
    let Json(body) = body.map_err(invalid_body)?;
    let report = state.analysis.analyze(body.into_request(user_id)).await?;
    Ok(Json(AnalysisOutcome::from(report)))
}

/// Balance and usage level for the calling user
pub async fn get_account(
    State(state): State<Arc<ServerState>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<AccountSummary>, ApiError> {
    let account = state.ledger.account(user_id).await?;
    Ok(Json(AccountSummary::from(&account)))
}

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub records: Vec<UsageRecord>,
}

/// Most recent usage records for the calling user, newest first
pub async fn list_usage(
    State(state): State<Arc<ServerState>>,
    CurrentUser(user_id): CurrentUser,
    Query(query): Query<UsageQuery>,
) -> Json<UsageResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_USAGE_LIMIT).min(MAX_USAGE_LIMIT);
    let records = state.usage.list_for_user(user_id, limit).await;
    Json(UsageResponse { records })
}

#[derive(Debug, Deserialize)]
pub struct OpenAccountBody {
    pub user_id: UserId,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub tokens: u64,
}

/// Provision a token account
pub async fn open_account(
    State(state): State<Arc<ServerState>>,
    _admin: AdminAccess,
    body: Result<Json<OpenAccountBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body.map_err(invalid_body)?;
    let account = state.ledger.open_account(body.user_id, body.plan, body.tokens).await?;
    Ok((StatusCode::CREATED, Json(AccountSummary::from(&account))))
}

#[derive(Debug, Deserialize)]
pub struct CreditBody {
    pub user_id: UserId,
    pub tokens: u64,
}

/// Top up an existing account
pub async fn credit_account(
    State(state): State<Arc<ServerState>>,
    _admin: AdminAccess,
    body: Result<Json<CreditBody>, JsonRejection>,
) -> Result<Json<AccountSummary>, ApiError> {
    let Json(body) = body.map_err(invalid_body)?;
    if body.tokens == 0 {
        return Err(ApiError::BadRequest("Credit amount must be positive.".to_string()));
    }
    state.ledger.credit(body.user_id, body.tokens).await?;
    let account = state.ledger.account(body.user_id).await?;
    Ok(Json(AccountSummary::from(&account)))
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub provider: String,
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        provider: state.analysis.provider_name().to_string(),
    })
}
