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

const PROVIDER: &str = "openai";

/// OpenAI chat-completions backend.
pub struct OpenAiGateway {
    client: Client,
    api_key: ApiKey,
    model: String,
    base_url: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl OpenAiGateway {
    pub fn new(model: &str, config: &ModelConfig, api_key: ApiKey) -> Result<Self, AgentError> {
        let timeout = Duration::from_secs(config.timeout_seconds);
        Ok(Self {
            client: build_client(timeout)?,
            api_key,
            model: model.to_string(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout,
        })
    }

    fn body(&self, request: &ModelRequest) -> Value {
        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system_prompt},
                {"role": "user", "content": request.user_prompt}
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens
        })
    }
}

#[async_trait]
impl ModelGateway for OpenAiGateway {
    fn name(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, request: &ModelRequest) -> Result<String, AgentError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.model, url = %url, "Calling OpenAI");

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose())
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
        extract_content(&payload)
    }
}

/// First choice's message text, verbatim.
fn extract_content(payload: &Value) -> Result<String, AgentError> {
    match payload["choices"][0]["message"]["content"].as_str() {
        Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
        _ => Err(AgentError::Transient(
            "openai returned no message content".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> OpenAiGateway {
        OpenAiGateway::new("gpt-4o-mini", &ModelConfig::default(), ApiKey::new("sk-test")).unwrap()
    }

    #[test]
    fn request_body_carries_both_prompts() {
        let body = gateway().body(&ModelRequest {
            system_prompt: "sys".to_string(),
            user_prompt: "usr".to_string(),
        });
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "sys");
        assert_eq!(body["messages"][1]["content"], "usr");
        assert_eq!(body["max_tokens"], 2000);
    }

    #[test]
    fn extracts_content_verbatim() {
        let payload = json!({"choices": [{"message": {"role": "assistant", "content": "## SUMMARY\n  text  "}}]});
        assert_eq!(extract_content(&payload).unwrap(), "## SUMMARY\n  text  ");
    }

    #[test]
    fn empty_content_is_transient() {
        let payload = json!({"choices": [{"message": {"content": "   "}}]});
        assert!(extract_content(&payload).unwrap_err().is_retryable());
        assert!(extract_content(&json!({"choices": []})).unwrap_err().is_retryable());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let config = ModelConfig {
            openai_base_url: "http://localhost:8080/v1/".to_string(),
            ..Default::default()
        };
        let gw = OpenAiGateway::new("gpt-4o", &config, ApiKey::new("k")).unwrap();
        assert_eq!(gw.base_url, "http://localhost:8080/v1");
    }
}
