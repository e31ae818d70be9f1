use std::io::ErrorKind as IoErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::AgentError;
use crate::gateway::ModelGateway;
use crate::prompts::ModelRequest;

/// Backend that shells out to the local `claude` CLI.
#[derive(Debug, Clone)]
pub struct ClaudeCliGateway {
    pub model: String,
    pub timeout: Duration,
    pub program: String,
}

impl ClaudeCliGateway {
    pub fn new(model: &str, timeout: Duration) -> Self {
        Self {
            model: model.to_string(),
            timeout,
            program: "claude".to_string(),
        }
    }
}

impl Default for ClaudeCliGateway {
    fn default() -> Self {
        Self::new("claude-3-5-haiku-latest", Duration::from_secs(60))
    }
}

#[async_trait]
impl ModelGateway for ClaudeCliGateway {
    fn name(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, request: &ModelRequest) -> Result<String, AgentError> {
        debug!(model = %self.model, "Invoking claude CLI");

        let output = tokio::time::timeout(self.timeout, async {
            Command::new(&self.program)
                .args([
                    "-p",
                    request.user_prompt.as_str(),
                    "--system-prompt",
                    request.system_prompt.as_str(),
                    "--model",
                    self.model.as_str(),
                    "--output-format",
                    "text",
                ])
                .kill_on_drop(true)
                .output()
                .await
        })
        .await
        .map_err(|_| AgentError::Timeout(self.timeout))?
        .map_err(|e| match e.kind() {
            IoErrorKind::NotFound => {
                AgentError::Fatal(format!("`{}` not found on PATH", self.program))
            }
            _ => AgentError::Transient(format!("failed to spawn {}: {e}", self.program)),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = %output.status, stderr = %stderr, "Claude CLI failed");
            return Err(AgentError::Transient(format!(
                "{} exited {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if stdout.trim().is_empty() {
            return Err(AgentError::Transient(
                "claude returned an empty response".to_string(),
            ));
        }
        Ok(stdout)
    }
}

/// Check if the `claude` CLI is available on the system.
pub async fn check_cli_available() -> bool {
    match Command::new("claude").arg("--version").output().await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ModelRequest {
        ModelRequest {
            system_prompt: "sys".to_string(),
            user_prompt: "usr".to_string(),
        }
    }

    #[test]
    fn default_gateway() {
        let gw = ClaudeCliGateway::default();
        assert_eq!(gw.model, "claude-3-5-haiku-latest");
        assert_eq!(gw.timeout, Duration::from_secs(60));
        assert_eq!(gw.name(), "claude-3-5-haiku-latest");
    }

    #[tokio::test]
    async fn missing_binary_is_fatal() {
        let gw = ClaudeCliGateway {
            program: "definitely-not-a-real-claude-binary".to_string(),
            ..ClaudeCliGateway::default()
        };
        let err = gw.invoke(&request()).await.unwrap_err();
        assert!(matches!(err, AgentError::Fatal(_)), "got {err:?}");
    }
}
