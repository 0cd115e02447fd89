//! Integration tests for Sheetwise
//!
//! These tests drive the HTTP router against a mocked chat-completions
//! endpoint, so the whole request path (identity, quota, prompt, provider,
//! parser, ledger, usage log) runs together.

use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use sheetwise_ai::providers::create_provider;
use sheetwise_ai::{AnalysisConfig, AnalysisService};
use sheetwise_core::{
    DurableLedger, InMemoryLedger, QuotaLedger, UsageLog, UsageRecorder, UserId, load_ledger, usage_journal_path,
};
use sheetwise_server::{ServerState, create_router};
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const USER: UserId = UserId(7);

struct Stack {
    app: Router,
    ledger: Arc<dyn QuotaLedger>,
    usage: Arc<UsageLog>,
}

fn provider_config(server: &MockServer) -> AnalysisConfig {
    AnalysisConfig {
        api_url: format!("{}/v1/chat/completions", server.uri()),
        api_key: Some("sk-integration".to_string()),
        timeout: Duration::from_secs(5),
        max_retries: 1,
        retry_base_delay: Duration::from_millis(1),
        ..AnalysisConfig::default()
    }
}

async fn stack(server: &MockServer, balance: u64, usage: UsageLog) -> Stack {
    stack_with(server, balance, Arc::new(InMemoryLedger::new()), usage).await
}

async fn stack_with(server: &MockServer, balance: u64, ledger: Arc<dyn QuotaLedger>, usage: UsageLog) -> Stack {
    let config = provider_config(server);
    ledger.open_account(USER, Some("starter".to_string()), balance).await.unwrap();
    let usage = Arc::new(usage);

    let provider = create_provider(&config).unwrap();
    let analysis = AnalysisService::from_config(&config, ledger.clone(), usage.clone(), provider);
    let state = ServerState::new(analysis, ledger.clone(), usage.clone());

    Stack {
        app: create_router(Arc::new(state)),
        ledger,
        usage,
    }
}

fn completion(content: &str, total_tokens: u64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "chatcmpl-1",
        "model": "gpt-4o-mini",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"}],
        "usage": {"prompt_tokens": total_tokens / 2, "completion_tokens": total_tokens - total_tokens / 2, "total_tokens": total_tokens}
    }))
}

async fn mock_completions(server: &MockServer, response: ResponseTemplate, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-integration"))
        .respond_with(response)
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn analyze(app: &Router, question: &str) -> (StatusCode, Value) {
    let body = json!({
        "question": question,
        "dataset_name": "regional_sales.xlsx",
        "dataset": [
            {"region": "North", "quarter": "Q1", "revenue": 1200},
            {"region": "South", "quarter": "Q1", "revenue": 950},
            {"region": "East", "quarter": "Q1", "revenue": 1430}
        ]
    });
    let request = Request::builder()
        .method("POST")
        .uri("/api/analyze")
        .header("content-type", "application/json")
        .header("x-user-id", USER.to_string())
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

/// Balance 500, provider reports 120 tokens and answers with a bar chart
#[tokio::test]
async fn test_analysis_with_chart_is_metered() {
    let server = MockServer::start().await;
    let answer = r#"East leads the quarter with 1,430 in revenue.

```json
{
  "type": "bar",
  "data": {
    "labels": ["North", "South", "East"],
    "datasets": [{"label": "Q1 revenue", "data": [1200, 950, 1430]}]
  },
  "options": {"plugins": {"legend": {"display": false}}}
}
```"#;
    mock_completions(&server, completion(answer, 120), 1).await;
    let stack = stack(&server, 500, UsageLog::in_memory()).await;

    let (status, body) = analyze(&stack.app, "Which region sold the most?").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["tokens_used"], 120);
    assert_eq!(body["tokens_remaining"], 380);
    assert_eq!(body["visualization"]["type"], "bar");
    assert_eq!(body["visualization"]["data"]["labels"], json!(["North", "South", "East"]));
    assert_eq!(body["visualization"]["options"]["plugins"]["legend"]["display"], false);

    assert_eq!(stack.ledger.get_balance(USER).await.unwrap(), 380);
    let records = stack.usage.list_for_user(USER, 10).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].tokens_used, 120);
}

/// Balance 0: rejected before any outbound call
#[tokio::test]
async fn test_exhausted_balance_skips_provider() {
    let server = MockServer::start().await;
    mock_completions(&server, completion("unused", 10), 0).await;
    let stack = stack(&server, 0, UsageLog::in_memory()).await;

    let (status, body) = analyze(&stack.app, "Which region sold the most?").await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "insufficient_quota");
    assert!(stack.usage.is_empty().await);
    assert!(server.received_requests().await.unwrap().is_empty());
}

/// Gateway answers with an HTML error page instead of JSON
#[tokio::test]
async fn test_html_error_page_is_a_protocol_failure() {
    let server = MockServer::start().await;
    let page = "<!DOCTYPE html><html><head><title>504 Gateway Time-out</title></head><body>upstream-7.internal</body></html>";
    mock_completions(&server, ResponseTemplate::new(504).set_body_string(page), 1).await;
    let stack = stack(&server, 500, UsageLog::in_memory()).await;

    let (status, body) = analyze(&stack.app, "Which region sold the most?").await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "protocol");
    assert!(!body["message"].as_str().unwrap().contains("upstream-7"));
    assert_eq!(stack.ledger.get_balance(USER).await.unwrap(), 500);
    assert!(stack.usage.is_empty().await);
}

/// Prose-only answer: no chart, still debited
#[tokio::test]
async fn test_prose_answer_has_no_visualization() {
    let server = MockServer::start().await;
    mock_completions(&server, completion("Revenue is fairly even; East is slightly ahead of North.", 64), 1).await;
    let stack = stack(&server, 500, UsageLog::in_memory()).await;

    let (status, body) = analyze(&stack.app, "Is revenue balanced across regions?").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body.get("visualization").is_none());
    assert_eq!(body["tokens_remaining"], 436);
    assert_eq!(stack.usage.list_for_user(USER, 10).await[0].tokens_used, 64);
}

/// Upstream error payloads surface their message without being retried
#[tokio::test]
async fn test_upstream_error_payload() {
    let server = MockServer::start().await;
    let error = json!({"error": {"message": "You exceeded your current quota.", "type": "insufficient_quota"}});
    mock_completions(&server, ResponseTemplate::new(429).set_body_json(error), 1).await;
    let stack = stack(&server, 500, UsageLog::in_memory()).await;

    let (status, body) = analyze(&stack.app, "Which region sold the most?").await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "upstream");
    assert!(body["message"].as_str().unwrap().contains("exceeded your current quota"));
    assert_eq!(stack.ledger.get_balance(USER).await.unwrap(), 500);
}

/// Balances and usage survive a process that dies without a graceful shutdown
#[tokio::test]
async fn test_state_survives_abrupt_restart() {
    let data_dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    mock_completions(&server, completion("Steady.", 100), 1).await;

    let ledger = Arc::new(DurableLedger::open(data_dir.path()).unwrap());
    let journal = UsageLog::open(usage_journal_path(data_dir.path())).await.unwrap();
    let first = stack_with(&server, 500, ledger, journal).await;
    let (status, _) = analyze(&first.app, "Summarize").await;
    assert_eq!(status, StatusCode::OK);
    drop(first);

    let restored = load_ledger(data_dir.path()).unwrap().unwrap();
    assert_eq!(restored.get_balance(USER).await.unwrap(), 400);
    let reopened = DurableLedger::open(data_dir.path()).unwrap();
    assert_eq!(reopened.get_balance(USER).await.unwrap(), 400);

    let usage = UsageLog::open(usage_journal_path(data_dir.path())).await.unwrap();
    let records = usage.list_for_user(USER, 10).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].tokens_used, 100);
}

/// Test that the CLI can be invoked
#[test]
fn test_cli_invocation() {
    let output = Command::new(env!("CARGO_BIN_EXE_sheetwise"))
        .arg("--help")
        .output()
        .expect("Failed to execute sheetwise");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("Token-metered AI analysis service"));
    assert!(stdout.contains("serve"));

    let output = Command::new(env!("CARGO_BIN_EXE_sheetwise")).arg("version").output().unwrap();
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("Sheetwise v"));
}
