//! Request orchestration: validate, check quota, call the model, settle usage

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use sheetwise_core::{
    ActionType, AnalysisRequest, LedgerError, NewUsageRecord, QuotaLedger, Settlement, UsageRecorder, UserId,
    estimate_tokens,
};
use tracing::{debug, error, info, warn};

use crate::bridge::{CompletionProvider, CompletionRequest};
use crate::chart::VisualizationSpec;
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, CompletionError, ErrorKind};
use crate::parser::extract_visualization;
use crate::prompt::PromptBuilder;

/// Pipeline checkpoints, traced as a request moves through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    QuotaChecked,
    PromptBuilt,
    CompletionCalled,
    ResponseParsed,
    LedgerUpdated,
    Completed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::QuotaChecked => "quota_checked",
            Stage::PromptBuilt => "prompt_built",
            Stage::CompletionCalled => "completion_called",
            Stage::ResponseParsed => "response_parsed",
            Stage::LedgerUpdated => "ledger_updated",
            Stage::Completed => "completed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Successful analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub response_text: String,
    /// Usage reported by the provider
    pub tokens_used: u64,
    pub tokens_remaining: u64,
    pub visualization: Option<VisualizationSpec>,
    /// Reported tokens the balance could not cover
    pub uncharged_tokens: u64,
}

/// Result shape returned to dashboard clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_remaining: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visualization: Option<VisualizationSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

impl AnalysisOutcome {
    pub fn failure(err: &AnalysisError) -> Self {
        Self {
            success: false,
            response: None,
            tokens_used: None,
            tokens_remaining: None,
            visualization: None,
            message: Some(err.user_message()),
            error: Some(err.kind()),
        }
    }
}

impl From<AnalysisReport> for AnalysisOutcome {
    fn from(report: AnalysisReport) -> Self {
        Self {
            success: true,
            response: Some(report.response_text),
            tokens_used: Some(report.tokens_used),
            tokens_remaining: Some(report.tokens_remaining),
            visualization: report.visualization,
            message: None,
            error: None,
        }
    }
}

/// Runs analysis and chat requests end to end.
///
/// Every collaborator is injected, so the same service backs the HTTP API
/// and the tests.
#[derive(Clone)]
pub struct AnalysisService {
    ledger: Arc<dyn QuotaLedger>,
    usage: Arc<dyn UsageRecorder>,
    provider: Arc<dyn CompletionProvider>,
    prompts: Arc<PromptBuilder>,
    estimate_precheck: bool,
}

impl AnalysisService {
    pub fn new(
        ledger: Arc<dyn QuotaLedger>,
        usage: Arc<dyn UsageRecorder>,
        provider: Arc<dyn CompletionProvider>,
        prompts: PromptBuilder,
    ) -> Self {
        Self {
            ledger,
            usage,
            provider,
            prompts: Arc::new(prompts),
            estimate_precheck: false,
        }
    }

    pub fn from_config(
        config: &AnalysisConfig,
        ledger: Arc<dyn QuotaLedger>,
        usage: Arc<dyn UsageRecorder>,
        provider: Arc<dyn CompletionProvider>,
    ) -> Self {
        Self::new(ledger, usage, provider, PromptBuilder::from_config(config))
            .with_estimate_precheck(config.estimate_precheck)
    }

    /// Reject requests whose estimated prompt cost exceeds the balance.
    pub fn with_estimate_precheck(mut self, enabled: bool) -> Self {
        self.estimate_precheck = enabled;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Answer one question about one dataset.
    ///
    /// Nothing is debited or recorded unless the provider returns a usable
    /// completion. Once the call is in flight it runs on its own task, so a
    /// caller that goes away does not stop the usage from being settled.
    pub async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisReport, AnalysisError> {
        let user_id = request.user_id;
        let action = request.action;
        trace_stage(Stage::Received, user_id);

        if let Err(e) = validate(&request) {
            debug!(%user_id, error = %e, "Rejected analysis request");
            return Err(e);
        }

        let balance = self.ledger.get_balance(user_id).await?;
        if balance == 0 {
            debug!(%user_id, "No tokens left, skipping completion");
            return Err(AnalysisError::InsufficientQuota { available: 0 });
        }
        trace_stage(Stage::QuotaChecked, user_id);

        let completion_request = self.prompts.build(&request).map_err(|e| {
            error!(%user_id, "Failed to serialize dataset for prompt: {}", e);
            AnalysisError::Internal(format!("prompt serialization failed: {e}"))
        })?;
        if self.estimate_precheck {
            let estimate = estimate_tokens(completion_request.prompt_chars());
            if estimate > balance {
                debug!(%user_id, estimate, balance, "Estimated cost exceeds balance");
                return Err(AnalysisError::EstimateExceedsBalance { estimate, available: balance });
            }
        }
        trace_stage(Stage::PromptBuilt, user_id);

        let service = self.clone();
        let task = tokio::spawn(async move { service.complete_and_settle(user_id, action, completion_request).await });
        task.await.map_err(|e| {
            error!(%user_id, "Analysis task failed: {}", e);
            AnalysisError::Internal(format!("analysis task failed: {e}"))
        })?
    }

    async fn complete_and_settle(
        &self,
        user_id: UserId,
        action: ActionType,
        request: CompletionRequest,
    ) -> Result<AnalysisReport, AnalysisError> {
        let completion = self.provider.complete(&request).await.map_err(|e| {
            log_completion_failure(user_id, self.provider.name(), &e);
            AnalysisError::from(e)
        })?;
        let tokens = completion.tokens_used;
        debug!(%user_id, tokens, stage = %Stage::CompletionCalled, "Analysis stage");

        let visualization = extract_visualization(&completion.text);
        debug!(
            %user_id,
            stage = %Stage::ResponseParsed,
            chart_type = visualization.as_ref().map(|spec| spec.chart_type.as_str()),
            "Analysis stage"
        );

        let settlement = match self.settle(user_id, tokens).await {
            Ok(settlement) => settlement,
            Err(e) => {
                error!(%user_id, tokens, "Could not debit reported usage: {}", e);
                self.record_usage(NewUsageRecord::now(user_id, tokens, action).with_uncharged(tokens))
                    .await;
                return Err(e.into());
            }
        };
        self.record_usage(NewUsageRecord::now(user_id, tokens, action).with_uncharged(settlement.uncharged))
            .await;
        trace_stage(Stage::LedgerUpdated, user_id);

        info!(
            %user_id,
            %action,
            tokens,
            balance = settlement.balance,
            has_visualization = visualization.is_some(),
            "Analysis completed"
        );
        trace_stage(Stage::Completed, user_id);

        Ok(AnalysisReport {
            response_text: completion.text,
            tokens_used: tokens,
            tokens_remaining: settlement.balance,
            visualization,
            uncharged_tokens: settlement.uncharged,
        })
    }

    /// Debit the reported usage, draining to zero when it exceeds the balance.
    async fn settle(&self, user_id: UserId, tokens: u64) -> Result<Settlement, LedgerError> {
        match self.ledger.try_debit(user_id, tokens).await {
            Ok(balance) => Ok(Settlement {
                charged: tokens,
                uncharged: 0,
                balance,
            }),
            Err(LedgerError::InsufficientQuota { available, .. }) => {
                let settlement = self.ledger.debit_up_to(user_id, tokens).await?;
                warn!(
                    %user_id,
                    reported = tokens,
                    available,
                    charged = settlement.charged,
                    uncharged = settlement.uncharged,
                    "Reported usage exceeded balance; account drained"
                );
                Ok(settlement)
            }
            Err(e) => Err(e),
        }
    }

    async fn record_usage(&self, record: NewUsageRecord) {
        let user_id = record.user_id;
        if let Err(e) = self.usage.record(record).await {
            error!(%user_id, "Failed to record usage: {}", e);
        }
    }
}

fn trace_stage(stage: Stage, user_id: UserId) {
    debug!(%user_id, stage = %stage, "Analysis stage");
}

fn validate(request: &AnalysisRequest) -> Result<(), AnalysisError> {
    if request.question.trim().is_empty() {
        return Err(AnalysisError::Validation("Please enter a question about your data.".to_string()));
    }
    if request.dataset.is_empty() {
        return Err(AnalysisError::Validation("The uploaded dataset has no rows.".to_string()));
    }
    if let Some((row, column)) = request.dataset.first_non_scalar() {
        return Err(AnalysisError::Validation(format!(
            "Row {} has a nested value in column '{}'; only plain cell values are supported.",
            row + 1,
            column
        )));
    }
    Ok(())
}

fn log_completion_failure(user_id: UserId, provider: &str, e: &CompletionError) {
    match e {
        CompletionError::Config(_) => error!(%user_id, provider, "Completion provider misconfigured: {}", e),
        CompletionError::Protocol { kind, status, snippet } => {
            warn!(%user_id, provider, status, failure = %kind, body = %snippet, "Undecodable completion response")
        }
        _ => warn!(%user_id, provider, "Completion failed: {}", e),
    }
}
