//! End-to-end analysis scenarios.
//!
//! Each test drives `AnalysisPipeline` with a `FixtureGateway` standing in
//! for the model service, so the whole path (context building, prompt
//! compilation, retry, parsing) runs without network access.

use std::sync::Arc;
use std::time::Duration;

use bwic_agents::test_support::{sample_input, FixtureGateway, WELL_FORMED_RESPONSE};
use bwic_agents::{
    format_analysis, AgentError, AnalysisPipeline, ContextBuilder, ErrorKind, RetryPolicy,
};
use bwic_models::config::{AnalysisConfig, DeadlinePolicy};
use bwic_models::AnalysisInput;
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        attempt_timeout: None,
    }
}

/// The sample auction with its deadline two hours from now.
fn live_input() -> AnalysisInput {
    let mut input = sample_input();
    input.bwic.deadline = (Utc::now() + ChronoDuration::hours(2)).to_rfc3339();
    input
}

fn pipeline(gateway: &FixtureGateway, retry: RetryPolicy) -> AnalysisPipeline {
    AnalysisPipeline::new(Arc::new(gateway.clone()), ContextBuilder::default(), retry)
}

#[tokio::test]
async fn corporate_bwic_full_analysis() {
    let gateway = FixtureGateway::always(WELL_FORMED_RESPONSE);
    let analysis = pipeline(&gateway, fast_retry(3))
        .analyze(live_input())
        .await
        .unwrap();

    assert!(!analysis.is_partial());
    assert_eq!(analysis.scenarios.len(), 4);
    let bids: Vec<_> = analysis.scenarios.iter().map(|s| s.bid_price).collect();
    assert_eq!(bids, vec![dec!(100.28), dec!(100.30), dec!(100.32), dec!(100.35)]);
    for s in &analysis.scenarios {
        assert!(s.win_probability_low <= s.win_probability_high);
        assert!(s.pnl_low <= s.pnl_high);
    }

    // The request carried the auction's facts.
    let request = gateway.last_request().await.unwrap();
    assert!(request.user_prompt.contains("Apple Inc 3.5% 2030 (037833DX5)"));
    assert!(request.user_prompt.contains("Fair value: 100.35"));
    assert!(request.user_prompt.contains("10Y: 4.00"));

    let report = format_analysis(&analysis);
    assert!(report.contains("BID SCENARIOS:"));
    assert!(report.contains("Urgency: Medium"));
}

#[tokio::test]
async fn treasury_bwic_with_minimal_data() {
    let input: AnalysisInput = serde_json::from_str(&format!(
        r#"{{
            "bwic": {{"cusip": "912828XZ8", "name": "UST 10Y", "size": "50", "deadline": "{}", "bond_type": "Treasury"}},
            "market": {{"curve_data": {{"2Y": "4.50", "10Y": "4.00"}}}},
            "valuation": {{"fair_value": "99.75"}},
            "constraints": {{"risk_appetite": "High", "inventory_level": "Medium"}}
        }}"#,
        (Utc::now() + ChronoDuration::hours(6)).to_rfc3339()
    ))
    .unwrap();

    let gateway = FixtureGateway::always(WELL_FORMED_RESPONSE);
    pipeline(&gateway, fast_retry(1)).analyze(input).await.unwrap();

    let prompt = gateway.last_request().await.unwrap().user_prompt;
    assert!(prompt.contains("- TRACE data: Not provided"));
    assert!(prompt.contains("- Historical BWICs: Not provided"));
    assert!(prompt.contains("- Risk appetite: High"));
}

#[tokio::test]
async fn aggressive_risk_appetite_is_rejected_before_any_call() {
    let gateway = FixtureGateway::always(WELL_FORMED_RESPONSE);
    let mut input = live_input();
    input.constraints.risk_appetite = "Aggressive".to_string();

    let err = pipeline(&gateway, fast_retry(3)).analyze(input).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("risk_appetite"));
    assert_eq!(gateway.calls(), 0);
}

#[tokio::test]
async fn elapsed_deadline_rejected_by_default() {
    let gateway = FixtureGateway::always(WELL_FORMED_RESPONSE);
    let err = pipeline(&gateway, fast_retry(1))
        .analyze(sample_input())
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Validation { ref field, .. } if field == "deadline"));
    assert_eq!(gateway.calls(), 0);
}

#[tokio::test]
async fn elapsed_deadline_allowed_when_configured() {
    let gateway = FixtureGateway::always(WELL_FORMED_RESPONSE);
    let builder = ContextBuilder::new(AnalysisConfig {
        deadline_policy: DeadlinePolicy::Warn,
        ..Default::default()
    });
    let pipeline = AnalysisPipeline::new(Arc::new(gateway.clone()), builder, fast_retry(1));
    pipeline.analyze(sample_input()).await.unwrap();

    let prompt = gateway.last_request().await.unwrap().user_prompt;
    assert!(prompt.contains("Time remaining: ELAPSED"));
    assert!(prompt.contains("Derived urgency: Critical"));
}

#[tokio::test]
async fn transient_failures_recover_within_budget() {
    let gateway = FixtureGateway::scripted(vec![
        Err(AgentError::Transient("openai returned HTTP 503".into())),
        Err(AgentError::Transient("openai returned HTTP 429 (retry in 1s)".into())),
        Ok(WELL_FORMED_RESPONSE.to_string()),
    ]);
    let analysis = pipeline(&gateway, fast_retry(3))
        .analyze(live_input())
        .await
        .unwrap();
    assert_eq!(analysis.scenarios.len(), 4);
    assert_eq!(gateway.calls(), 3);
}

#[tokio::test]
async fn transient_failures_exhaust_budget() {
    let gateway = FixtureGateway::scripted(vec![
        Err(AgentError::Timeout(Duration::from_secs(60))),
        Err(AgentError::Timeout(Duration::from_secs(60))),
    ]);
    let err = pipeline(&gateway, fast_retry(2))
        .analyze(live_input())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transient);
    assert_eq!(gateway.calls(), 2);
}

#[tokio::test]
async fn rejected_credentials_fail_immediately() {
    let gateway = FixtureGateway::scripted(vec![
        Err(AgentError::Fatal("openai returned HTTP 401".into())),
        Ok(WELL_FORMED_RESPONSE.to_string()),
    ]);
    let err = pipeline(&gateway, fast_retry(3))
        .analyze(live_input())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Fatal);
    assert_eq!(gateway.calls(), 1);
}

#[tokio::test]
async fn partial_response_is_returned_with_warnings() {
    let response = WELL_FORMED_RESPONSE.replace("## AUCTION DYNAMICS", "## NOTES");
    let gateway = FixtureGateway::always(&response);
    let analysis = pipeline(&gateway, fast_retry(1))
        .analyze(live_input())
        .await
        .unwrap();
    assert!(analysis.is_partial());
    assert_eq!(analysis.auction_dynamics, bwic_models::MISSING_SECTION_MARKER);
    assert!(format_analysis(&analysis).contains("PARTIAL RESULT"));
}

#[tokio::test]
async fn cancellation_abandons_model_call() {
    let gateway = FixtureGateway::always(WELL_FORMED_RESPONSE).with_delay(Duration::from_secs(30));
    let pipeline = pipeline(&gateway, fast_retry(3));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = pipeline
        .analyze_with_cancel(live_input(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Cancelled));
    assert_eq!(err.kind(), ErrorKind::Transient);
    assert_eq!(gateway.calls(), 1);
}

#[tokio::test]
async fn batch_keeps_input_order_and_isolates_failures() {
    let gateway = FixtureGateway::always(WELL_FORMED_RESPONSE);
    let pipeline = Arc::new(pipeline(&gateway, fast_retry(1)));

    let mut bad = live_input();
    bad.bwic.size = dec!(0);
    let mut second = live_input();
    second.bwic.cusip = "912828XZ8".to_string();

    let results = pipeline
        .analyze_batch(vec![live_input(), bad, second])
        .await;
    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert_eq!(results[1].as_ref().unwrap_err().kind(), ErrorKind::Validation);
    assert!(results[2].is_ok());
    assert_eq!(gateway.calls(), 2);
}
