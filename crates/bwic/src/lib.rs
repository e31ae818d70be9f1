//! BWIC win-probability analysis.
//!
//! Turns an auction description, market backdrop, valuation anchor and desk
//! constraints into a model-written analysis with 3-5 bid scenarios, each
//! carrying a win-probability range and expected P&L. The output is advisory.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use bwic::models::{AnalysisInput, BwicConfig, Credentials};
//! use bwic::agents::format_analysis;
//!
//! # async fn run(input: AnalysisInput) -> anyhow::Result<()> {
//! let config = BwicConfig::default();
//! let credentials = Credentials::from_lookup(|name| std::env::var(name).ok());
//! let pipeline = bwic::build_pipeline(None, &config, &credentials)?;
//! let analysis = pipeline.analyze(input).await?;
//! println!("{}", format_analysis(&analysis));
//! # Ok(())
//! # }
//! ```

pub use bwic_agents as agents;
pub use bwic_models as models;

pub mod input;

use std::sync::Arc;
use std::time::Duration;

use bwic_agents::registry::{resolve_model, Provider};
use bwic_agents::{
    AgentError, AnalysisPipeline, ClaudeCliGateway, ContextBuilder, GeminiGateway, ModelGateway,
    OpenAiGateway, RetryPolicy,
};
use bwic_models::analysis::Analysis;
use bwic_models::bwic_input::{
    AnalysisInput, BwicDetails, MarketContext, TraderConstraints, ValuationData,
};
use bwic_models::config::{BwicConfig, Credentials, ModelConfig};
use tracing::info;

/// Build the gateway for a model identifier. A missing key for the chosen
/// provider is a configuration error.
pub fn build_gateway(
    model_name: &str,
    config: &ModelConfig,
    credentials: &Credentials,
) -> Result<Arc<dyn ModelGateway>, AgentError> {
    let spec = resolve_model(model_name)?;
    info!(model = spec.id, provider = ?spec.provider, "Using model");

    let missing = |env: &str| {
        AgentError::Fatal(format!("{env} is not set; it is required for model `{}`", spec.id))
    };

    let gateway: Arc<dyn ModelGateway> = match spec.provider {
        Provider::OpenAi => {
            let key = credentials
                .openai
                .clone()
                .ok_or_else(|| missing(Credentials::OPENAI_ENV))?;
            Arc::new(OpenAiGateway::new(spec.api_model, config, key)?)
        }
        Provider::Gemini => {
            let key = credentials
                .gemini
                .clone()
                .ok_or_else(|| missing(Credentials::GEMINI_ENV))?;
            Arc::new(GeminiGateway::new(spec.api_model, config, key)?)
        }
        Provider::ClaudeCli => Arc::new(ClaudeCliGateway::new(
            spec.api_model,
            Duration::from_secs(config.timeout_seconds),
        )),
    };
    Ok(gateway)
}

/// Build a pipeline for `model_name`, or the configured default model.
pub fn build_pipeline(
    model_name: Option<&str>,
    config: &BwicConfig,
    credentials: &Credentials,
) -> Result<AnalysisPipeline, AgentError> {
    let name = model_name.unwrap_or(&config.model.name);
    let gateway = build_gateway(name, &config.model, credentials)?;
    Ok(pipeline_with_gateway(gateway, config))
}

/// Build a pipeline around an existing gateway.
pub fn pipeline_with_gateway(
    gateway: Arc<dyn ModelGateway>,
    config: &BwicConfig,
) -> AnalysisPipeline {
    // One second over the backend's own timeout.
    let attempt_timeout = Duration::from_secs(config.model.timeout_seconds + 1);
    AnalysisPipeline::new(
        gateway,
        ContextBuilder::new(config.analysis.clone()),
        RetryPolicy::from_config(&config.retry, Some(attempt_timeout)),
    )
}

/// One-shot analysis from the four input records.
pub async fn analyze(
    bwic: BwicDetails,
    market: MarketContext,
    valuation: ValuationData,
    constraints: TraderConstraints,
    model_name: Option<&str>,
    config: &BwicConfig,
    credentials: &Credentials,
) -> Result<Analysis, AgentError> {
    let pipeline = build_pipeline(model_name, config, credentials)?;
    pipeline
        .analyze(AnalysisInput {
            bwic,
            market,
            valuation,
            constraints,
        })
        .await
}
