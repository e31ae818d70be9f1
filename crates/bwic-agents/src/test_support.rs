//! Test support: a scripted model gateway and a realistic sample auction.
//!
//! `FixtureGateway` stands in for a model service so the pipeline can be
//! driven end to end without network access or credentials.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bwic_models::bwic_input::AnalysisInput;
use tokio::sync::Mutex;

use crate::error::AgentError;
use crate::gateway::ModelGateway;
use crate::prompts::ModelRequest;

/// A well-formed answer with four scenarios.
pub const WELL_FORMED_RESPONSE: &str = crate::demo::DEMO_RESPONSE;

/// The Apple 3.5% 2030 sample auction.
pub const SAMPLE_INPUT_JSON: &str = crate::demo::DEMO_INPUT_JSON;

/// The sample auction, deadline 2024-01-20 14:00 UTC.
pub fn sample_input() -> AnalysisInput {
    serde_json::from_str(SAMPLE_INPUT_JSON).expect("sample input is valid JSON")
}

/// Gateway returning scripted results in order, then a fixed answer.
#[derive(Clone)]
pub struct FixtureGateway {
    name: String,
    script: Arc<Mutex<VecDeque<Result<String, AgentError>>>>,
    fallback: Option<String>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    last_request: Arc<Mutex<Option<ModelRequest>>>,
}

impl FixtureGateway {
    /// Always answers with `text`.
    pub fn always(text: &str) -> Self {
        Self::build(VecDeque::new(), Some(text.to_string()))
    }

    /// Plays `results` once each; further calls fail fatally.
    pub fn scripted(results: Vec<Result<String, AgentError>>) -> Self {
        Self::build(results.into(), None)
    }

    fn build(script: VecDeque<Result<String, AgentError>>, fallback: Option<String>) -> Self {
        Self {
            name: "fixture".to_string(),
            script: Arc::new(Mutex::new(script)),
            fallback,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Calls started so far, across clones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn last_request(&self) -> Option<ModelRequest> {
        self.last_request.lock().await.clone()
    }
}

#[async_trait]
impl ModelGateway for FixtureGateway {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, request: &ModelRequest) -> Result<String, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().await = Some(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(next) = self.script.lock().await.pop_front() {
            return next;
        }
        self.fallback
            .clone()
            .ok_or_else(|| AgentError::Fatal("fixture script exhausted".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request() -> ModelRequest {
        ModelRequest {
            system_prompt: "s".to_string(),
            user_prompt: "u".to_string(),
        }
    }

    #[test]
    fn sample_input_keeps_decimal_scale() {
        let input = sample_input();
        assert_eq!(input.market.curve_data.as_ref().unwrap()["10Y"].to_string(), "4.00");
        assert_eq!(input.valuation.fair_value, Some(dec!(100.35)));
        assert_eq!(input.constraints.target_hold_period, Some(5));
    }

    #[tokio::test]
    async fn scripted_then_exhausted() {
        let gw = FixtureGateway::scripted(vec![Ok("one".to_string())]);
        assert_eq!(gw.invoke(&request()).await.unwrap(), "one");
        assert!(matches!(gw.invoke(&request()).await, Err(AgentError::Fatal(_))));
        assert_eq!(gw.calls(), 2);
    }

    #[tokio::test]
    async fn clones_share_call_count() {
        let gw = FixtureGateway::always("text");
        let other = gw.clone();
        other.invoke(&request()).await.unwrap();
        assert_eq!(gw.calls(), 1);
        assert_eq!(gw.last_request().await, Some(request()));
    }
}
