//! CLI command implementations

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use sheetwise_ai::providers::create_provider;
use sheetwise_ai::{AnalysisConfig, AnalysisService, ProviderKind};
use sheetwise_core::{
    AccountSummary, DurableLedger, InMemoryLedger, QuotaLedger, UsageLog, load_ledger, usage_journal_path,
};
use sheetwise_server::{ServerConfig, ServerState, SheetwiseServer};

pub async fn serve(host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let analysis_config = AnalysisConfig::load().context("Invalid analysis configuration")?;
    let mut server_config = ServerConfig::load().context("Invalid server configuration")?;
    if let Some(host) = host {
        server_config.host = host;
    }
    if let Some(port) = port {
        server_config.port = port;
    }

    let data_dir = server_config.data_dir.clone();
    let ledger = open_ledger(data_dir.as_deref())?;
    let usage = Arc::new(open_usage_log(data_dir.as_deref()).await?);

    let provider = create_provider(&analysis_config).context("Failed to create completion provider")?;
    if analysis_config.provider == ProviderKind::OpenAi && analysis_config.api_key.is_none() {
        tracing::warn!("No API key configured; analysis requests will fail until SHEETWISE_API_KEY is set");
    }
    tracing::info!(
        provider = provider.name(),
        model = %analysis_config.model,
        max_rows = analysis_config.max_rows,
        "Completion provider ready"
    );

    let analysis = AnalysisService::from_config(&analysis_config, ledger.clone(), usage.clone(), provider);
    let state = ServerState::new(analysis, ledger, usage).with_admin_token(server_config.admin_token.clone());
    let server = SheetwiseServer::new(server_config, state);

    server.start(shutdown_signal()).await.map_err(Into::into)
}

pub fn accounts() -> anyhow::Result<()> {
    let config = ServerConfig::load().context("Invalid server configuration")?;
    let Some(data_dir) = config.data_dir else {
        anyhow::bail!("SHEETWISE_DATA_DIR is not set, so no accounts are persisted");
    };

    let Some(ledger) = load_ledger(&data_dir).context("Failed to read ledger snapshot")? else {
        println!("No ledger snapshot in {}", data_dir.display());
        return Ok(());
    };

    println!("{:>10}  {:<12} {:>12} {:>12} {:>7}  LEVEL", "USER", "PLAN", "REMAINING", "PURCHASED", "USED");
    for account in ledger.snapshot() {
        let summary = AccountSummary::from(&account);
        println!(
            "{:>10}  {:<12} {:>12} {:>12} {:>6.1}%  {:?}",
            summary.user_id.0,
            summary.plan.as_deref().unwrap_or("-"),
            summary.tokens_remaining,
            summary.total_tokens_purchased,
            summary.usage_percentage,
            summary.level
        );
    }
    Ok(())
}

/// Balances persist on every change when a data directory is configured.
fn open_ledger(data_dir: Option<&Path>) -> anyhow::Result<Arc<dyn QuotaLedger>> {
    let Some(dir) = data_dir else {
        tracing::info!("SHEETWISE_DATA_DIR not set; balances are kept in memory only");
        return Ok(Arc::new(InMemoryLedger::new()));
    };

    let ledger = DurableLedger::open(dir)
        .with_context(|| format!("Failed to open ledger in {}", dir.display()))?;
    tracing::info!(accounts = ledger.ledger().len(), path = %dir.display(), "Ledger restored");
    Ok(Arc::new(ledger))
}

async fn open_usage_log(data_dir: Option<&Path>) -> anyhow::Result<UsageLog> {
    let Some(dir) = data_dir else {
        return Ok(UsageLog::in_memory());
    };

    let path = usage_journal_path(dir);
    let log = UsageLog::open(&path)
        .await
        .with_context(|| format!("Failed to open usage journal {}", path.display()))?;
    let records = log.len().await;
    tracing::info!(records, path = %path.display(), "Usage journal loaded");
    Ok(log)
}

/// Resolves on ctrl-c, or on SIGTERM where signals exist.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received, draining requests");
}
