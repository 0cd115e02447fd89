//! Axum router setup for the Sheetwise server

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::ServerState;
use crate::handlers::{analyze, credit_account, get_account, health_check, list_usage, open_account};

/// Uploaded datasets travel inline in the analyze body.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Create the axum router with all routes
pub fn create_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/api/analyze", post(analyze))
        .route("/api/account", get(get_account))
        .route("/api/account/usage", get(list_usage))
        // Provisioning, gated by the admin token
        .route("/api/admin/accounts", post(open_account))
        .route("/api/admin/credit", post(credit_account))
        .route("/api/health", get(health_check))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
