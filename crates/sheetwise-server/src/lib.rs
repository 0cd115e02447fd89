//! HTTP API server for Sheetwise

pub mod auth;
pub mod error;
pub mod handlers;
pub mod router;


use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use sheetwise_ai::AnalysisService;
use sheetwise_core::config::{figment, optional_string};
use sheetwise_core::{QuotaLedger, UsageRecorder};
use tokio::net::TcpListener;
use tracing::info;

pub use error::ApiError;
pub use router::create_router;

/// Listener and persistence settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Where the ledger snapshot and usage journal live; in-memory only when unset
    #[serde(deserialize_with = "optional_path")]
    pub data_dir: Option<PathBuf>,
    /// Shared secret for the admin endpoints; they are disabled when unset
    #[serde(deserialize_with = "optional_string")]
    pub admin_token: Option<String>,
}

fn optional_path<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    optional_string(deserializer).map(|path| path.map(PathBuf::from))
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: None,
            admin_token: None,
        }
    }
}

impl ServerConfig {
    #[allow(clippy::result_large_err)]
    pub fn load() -> Result<Self, figment::Error> {
        figment().extract()
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Shared handler state.
pub struct ServerState {
    pub analysis: AnalysisService,
    pub ledger: Arc<dyn QuotaLedger>,
    pub usage: Arc<dyn UsageRecorder>,
    pub admin_token: Option<String>,
}

impl ServerState {
    pub fn new(analysis: AnalysisService, ledger: Arc<dyn QuotaLedger>, usage: Arc<dyn UsageRecorder>) -> Self {
        Self {
            analysis,
            ledger,
            usage,
            admin_token: None,
        }
    }

    pub fn with_admin_token(mut self, admin_token: Option<String>) -> Self {
        self.admin_token = admin_token.filter(|token| !token.is_empty());
        self
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct SheetwiseServer {
    config: ServerConfig,
    state: Arc<ServerState>,
}

impl SheetwiseServer {
    pub fn new(config: ServerConfig, state: ServerState) -> Self {
        Self {
            config,
            state: Arc::new(state),
        }
    }

    pub fn router(&self) -> axum::Router {
        create_router(self.state.clone())
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn start<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr: addr.clone(), source })?;

        info!(
            %addr,
            provider = self.state.analysis.provider_name(),
            admin_api = self.state.admin_token.is_some(),
            "Sheetwise listening"
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Server stopped");
        Ok(())
    }
}
