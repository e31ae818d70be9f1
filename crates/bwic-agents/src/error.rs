use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Model call failed (transient): {0}")]
    Transient(String),

    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Model call cancelled by caller")]
    Cancelled,

    #[error("Model call failed: {0}")]
    Fatal(String),

    #[error("Model response unusable: {0}")]
    Parse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The four outcomes callers distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Transient,
    Fatal,
    Parse,
}

impl AgentError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AgentError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::Validation { .. } => ErrorKind::Validation,
            AgentError::Transient(_) | AgentError::Timeout(_) | AgentError::Cancelled => {
                ErrorKind::Transient
            }
            AgentError::Fatal(_) | AgentError::Json(_) => ErrorKind::Fatal,
            AgentError::Parse(_) => ErrorKind::Parse,
        }
    }

    /// Cancellation is transient but abandons the call, so it is not retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AgentError::Transient(_) | AgentError::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(
            AgentError::validation("size", "must be positive").kind(),
            ErrorKind::Validation
        );
        assert_eq!(AgentError::Timeout(Duration::from_secs(60)).kind(), ErrorKind::Transient);
        assert_eq!(AgentError::Cancelled.kind(), ErrorKind::Transient);
        assert_eq!(AgentError::Fatal("401".into()).kind(), ErrorKind::Fatal);
        assert_eq!(AgentError::Parse("no table".into()).kind(), ErrorKind::Parse);
    }

    #[test]
    fn retryable_only_for_transport_failures() {
        assert!(AgentError::Transient("503".into()).is_retryable());
        assert!(AgentError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(!AgentError::Cancelled.is_retryable());
        assert!(!AgentError::Fatal("bad key".into()).is_retryable());
        assert!(!AgentError::Parse("x".into()).is_retryable());
    }

    #[test]
    fn timeout_message_keeps_sub_second_limits() {
        assert_eq!(
            AgentError::Timeout(Duration::from_millis(250)).to_string(),
            "Model call timed out after 250ms"
        );
        assert_eq!(
            AgentError::Timeout(Duration::from_secs(60)).to_string(),
            "Model call timed out after 60s"
        );
    }

    #[test]
    fn validation_message_names_field() {
        let err = AgentError::validation("risk_appetite", "`Aggressive` is not one of Low, Medium, High");
        assert_eq!(
            err.to_string(),
            "Invalid risk_appetite: `Aggressive` is not one of Low, Medium, High"
        );
    }
}
