use std::sync::Arc;
use std::time::Instant;

use bwic_models::analysis::Analysis;
use bwic_models::bwic_input::AnalysisInput;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::context::ContextBuilder;
use crate::error::AgentError;
use crate::gateway::{invoke_with_retry, ModelGateway, RetryPolicy};
use crate::parser::{parse, ParseOutcome};
use crate::prompts::compile;

/// Context building, request compilation, model call and response parsing
/// for one auction at a time.
pub struct AnalysisPipeline {
    gateway: Arc<dyn ModelGateway>,
    builder: ContextBuilder,
    retry: RetryPolicy,
}

impl AnalysisPipeline {
    pub fn new(gateway: Arc<dyn ModelGateway>, builder: ContextBuilder, retry: RetryPolicy) -> Self {
        Self {
            gateway,
            builder,
            retry,
        }
    }

    pub async fn analyze(&self, input: AnalysisInput) -> Result<Analysis, AgentError> {
        self.analyze_with_cancel(input, &CancellationToken::new())
            .await
    }

    /// Like [`analyze`](Self::analyze), abandoning the model call when
    /// `cancel` fires.
    pub async fn analyze_with_cancel(
        &self,
        input: AnalysisInput,
        cancel: &CancellationToken,
    ) -> Result<Analysis, AgentError> {
        let start = Instant::now();
        let run_id = Uuid::new_v4();
        let cusip = input.bwic.cusip.clone();
        info!(%run_id, cusip = %cusip, model = self.gateway.name(), "Starting BWIC analysis");

        let context = self.builder.build(input).inspect_err(|e| {
            warn!(%run_id, cusip = %cusip, error = %e, "Rejected analysis input");
        })?;
        let request = compile(&context);

        let raw = invoke_with_retry(self.gateway.as_ref(), &request, &self.retry, cancel).await?;

        let analysis = match parse(&raw) {
            ParseOutcome::Parsed(analysis) => analysis,
            ParseOutcome::Partial(analysis) => {
                warn!(
                    %run_id,
                    cusip = %cusip,
                    warnings = analysis.warnings.len(),
                    "Analysis recovered partially"
                );
                analysis
            }
            outcome @ ParseOutcome::Unparseable { .. } => {
                error!(%run_id, cusip = %cusip, response_len = raw.len(), "Model response unusable");
                return outcome.into_result();
            }
        };

        info!(
            %run_id,
            cusip = %cusip,
            scenarios = analysis.scenarios.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Analysis complete"
        );
        Ok(analysis)
    }

    /// Analyze several auctions concurrently. Results come back in input order;
    /// one failure does not affect the others.
    pub async fn analyze_batch(
        self: Arc<Self>,
        inputs: Vec<AnalysisInput>,
    ) -> Vec<Result<Analysis, AgentError>> {
        let handles: Vec<_> = inputs
            .into_iter()
            .map(|input| {
                let pipeline = Arc::clone(&self);
                tokio::spawn(async move { pipeline.analyze(input).await })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(match handle.await {
                Ok(result) => result,
                Err(e) => {
                    error!(error = %e, "Analysis task panicked");
                    Err(AgentError::Fatal(format!("analysis task failed: {e}")))
                }
            });
        }
        results
    }
}
