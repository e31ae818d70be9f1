use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Top-level configuration for the BWIC analyzer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BwicConfig {
    pub model: ModelConfig,
    pub retry: RetryConfig,
    pub analysis: AnalysisConfig,
}

/// How the external model is reached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    /// Model identifier used when the caller does not pick one.
    pub name: String,
    /// Deadline for a single model call, in seconds. Independent of the
    /// auction deadline.
    pub timeout_seconds: u64,
    pub temperature: f32,
    pub max_tokens: u32,
    pub openai_base_url: String,
    pub gemini_base_url: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "gpt-4o-mini".to_string(),
            timeout_seconds: 60,
            temperature: 0.3,
            max_tokens: 2000,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }
}

/// Bounded retry for transient model failures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

/// What to do when the auction deadline has already passed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeadlinePolicy {
    /// Fail with a validation error.
    #[default]
    Reject,
    /// Log a warning and analyze at maximal urgency.
    Warn,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub deadline_policy: DeadlinePolicy,
    /// Typical market size in millions, used for the size-pressure part of the
    /// urgency bucket when no `daily_volume` liquidity figure is supplied.
    pub typical_size_mm: Decimal,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            deadline_policy: DeadlinePolicy::Reject,
            typical_size_mm: Decimal::TEN,
        }
    }
}

/// A model-service credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// Credentials for each provider, read once at startup.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub openai: Option<ApiKey>,
    pub gemini: Option<ApiKey>,
}

impl Credentials {
    pub const OPENAI_ENV: &'static str = "OPENAI_API_KEY";
    pub const GEMINI_ENV: &'static str = "GEMINI_API_KEY";

    /// Build from a variable lookup (usually `std::env::var(..).ok()`).
    /// Blank values count as absent.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(ApiKey::new)
        };
        Self {
            openai: read(Self::OPENAI_ENV),
            gemini: read(Self::GEMINI_ENV),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn roundtrip_bwic_config() {
        let config = BwicConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: BwicConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn config_from_toml() {
        let toml_str = r#"
[model]
name = "gemini-2.5-flash"
timeout_seconds = 30

[retry]
max_attempts = 2

[analysis]
deadline_policy = "warn"
typical_size_mm = "15"
"#;

        let config: BwicConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.model.name, "gemini-2.5-flash");
        assert_eq!(config.model.timeout_seconds, 30);
        assert_eq!(config.model.max_tokens, 2000);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.initial_backoff_ms, 500);
        assert_eq!(config.analysis.deadline_policy, DeadlinePolicy::Warn);
        assert_eq!(config.analysis.typical_size_mm, dec!(15));
    }

    #[test]
    fn empty_toml_is_all_defaults() {
        let config: BwicConfig = toml::from_str("").unwrap();
        assert_eq!(config, BwicConfig::default());
        assert_eq!(config.analysis.deadline_policy, DeadlinePolicy::Reject);
    }

    #[test]
    fn api_key_debug_is_redacted() {
        let key = ApiKey::new("sk-very-secret");
        let printed = format!("{:?}", key);
        assert!(!printed.contains("secret"));

        let creds = Credentials {
            openai: Some(key),
            gemini: None,
        };
        assert!(!format!("{creds:?}").contains("sk-very"));
    }

    #[test]
    fn credentials_ignore_blank_values() {
        let creds = Credentials::from_lookup(|name| match name {
            "OPENAI_API_KEY" => Some("  ".to_string()),
            "GEMINI_API_KEY" => Some("AIza-test".to_string()),
            _ => None,
        });
        assert!(creds.openai.is_none());
        assert_eq!(creds.gemini.unwrap().expose(), "AIza-test");
    }
}
