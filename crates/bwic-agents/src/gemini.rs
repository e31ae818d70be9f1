use std::time::Duration;

use async_trait::async_trait;
use bwic_models::config::{ApiKey, ModelConfig};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::AgentError;
use crate::gateway::ModelGateway;
use crate::http::{build_client, status_error, transport_error};
use crate::prompts::ModelRequest;

const PROVIDER: &str = "gemini";

/// Google Gemini `generateContent` backend.
pub struct GeminiGateway {
    client: Client,
    api_key: ApiKey,
    model: String,
    base_url: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl GeminiGateway {
    pub fn new(model: &str, config: &ModelConfig, api_key: ApiKey) -> Result<Self, AgentError> {
        let timeout = Duration::from_secs(config.timeout_seconds);
        Ok(Self {
            client: build_client(timeout)?,
            api_key,
            model: model.to_string(),
            base_url: config.gemini_base_url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout,
        })
    }

    fn body(&self, request: &ModelRequest) -> Value {
        json!({
            "systemInstruction": {"parts": [{"text": request.system_prompt}]},
            "contents": [{"role": "user", "parts": [{"text": request.user_prompt}]}],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_tokens
            }
        })
    }
}

#[async_trait]
impl ModelGateway for GeminiGateway {
    fn name(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, request: &ModelRequest) -> Result<String, AgentError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        debug!(model = %self.model, url = %url, "Calling Gemini");

        // Key goes in a header so it never appears in a logged URL.
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.api_key.expose())
            .json(&self.body(request))
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e, self.timeout))?;

        if !response.status().is_success() {
            return Err(status_error(PROVIDER, response).await);
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| transport_error(PROVIDER, e, self.timeout))?;
        extract_text(&payload)
    }
}

/// Concatenated text parts of the first candidate.
fn extract_text(payload: &Value) -> Result<String, AgentError> {
    if let Some(reason) = payload["promptFeedback"]["blockReason"].as_str() {
        return Err(AgentError::Fatal(format!(
            "gemini blocked the prompt: {reason}"
        )));
    }
    let text: String = payload["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<Vec<_>>()
                .concat()
        })
        .unwrap_or_default();
    if text.trim().is_empty() {
        let finish = payload["candidates"][0]["finishReason"]
            .as_str()
            .unwrap_or("none");
        return Err(AgentError::Transient(format!(
            "gemini returned no text (finish reason: {finish})"
        )));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_shape() {
        let gw = GeminiGateway::new("gemini-2.5-flash", &ModelConfig::default(), ApiKey::new("k")).unwrap();
        let body = gw.body(&ModelRequest {
            system_prompt: "sys".to_string(),
            user_prompt: "usr".to_string(),
        });
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "sys");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "usr");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 2000);
    }

    #[test]
    fn joins_text_parts() {
        let payload = json!({
            "candidates": [{"content": {"parts": [{"text": "## SUMMARY\n"}, {"text": "Fine."}]}}]
        });
        assert_eq!(extract_text(&payload).unwrap(), "## SUMMARY\nFine.");
    }

    #[test]
    fn empty_candidate_is_transient() {
        let payload = json!({"candidates": [{"finishReason": "MAX_TOKENS", "content": {"parts": []}}]});
        let err = extract_text(&payload).unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("MAX_TOKENS"));
    }

    #[test]
    fn blocked_prompt_is_fatal() {
        let payload = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        assert!(!extract_text(&payload).unwrap_err().is_retryable());
    }
}
