use serde::Serialize;

use crate::error::AgentError;

/// Which backend serves a model.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Gemini,
    /// The local `claude` command-line tool.
    ClaudeCli,
}

/// A recognized model identifier and the name sent to its backend.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ModelSpec {
    pub id: &'static str,
    pub provider: Provider,
    pub api_model: &'static str,
}

const fn spec(id: &'static str, provider: Provider, api_model: &'static str) -> ModelSpec {
    ModelSpec {
        id,
        provider,
        api_model,
    }
}

pub const RECOGNIZED_MODELS: &[ModelSpec] = &[
    spec("gpt-4o", Provider::OpenAi, "gpt-4o"),
    spec("gpt-4o-mini", Provider::OpenAi, "gpt-4o-mini"),
    spec("gpt-4-turbo", Provider::OpenAi, "gpt-4-turbo"),
    spec("gpt-3.5-turbo", Provider::OpenAi, "gpt-3.5-turbo"),
    spec("gemini-2.5-flash", Provider::Gemini, "gemini-2.5-flash"),
    spec("gemini-2.5-pro", Provider::Gemini, "gemini-2.5-pro"),
    // Retired Gemini names still accepted; served by the current models.
    spec("gemini-2.5-flash-lite", Provider::Gemini, "gemini-2.5-flash"),
    spec("gemini-1.5-flash", Provider::Gemini, "gemini-2.5-flash"),
    spec("gemini-1.5-flash-lite", Provider::Gemini, "gemini-2.5-flash"),
    spec("gemini-flash", Provider::Gemini, "gemini-2.5-flash"),
    spec("gemini-pro", Provider::Gemini, "gemini-2.5-pro"),
    spec(
        "claude-sonnet-4-5-20250929",
        Provider::ClaudeCli,
        "claude-sonnet-4-5-20250929",
    ),
    spec(
        "claude-3-5-haiku-latest",
        Provider::ClaudeCli,
        "claude-3-5-haiku-latest",
    ),
];

/// Look up a model identifier. Unknown identifiers are a configuration error.
pub fn resolve_model(name: &str) -> Result<ModelSpec, AgentError> {
    let wanted = name.trim();
    RECOGNIZED_MODELS
        .iter()
        .find(|m| m.id.eq_ignore_ascii_case(wanted))
        .copied()
        .ok_or_else(|| {
            AgentError::Fatal(format!(
                "unrecognized model `{name}`; expected one of: {}",
                model_ids().join(", ")
            ))
        })
}

pub fn model_ids() -> Vec<&'static str> {
    RECOGNIZED_MODELS.iter().map(|m| m.id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn resolves_known_models() {
        let m = resolve_model("gpt-4o-mini").unwrap();
        assert_eq!(m.provider, Provider::OpenAi);
        assert_eq!(m.api_model, "gpt-4o-mini");

        let m = resolve_model("Gemini-2.5-Flash").unwrap();
        assert_eq!(m.provider, Provider::Gemini);
        assert_eq!(m.id, "gemini-2.5-flash");
    }

    #[test]
    fn retired_gemini_names_map_to_current() {
        assert_eq!(resolve_model("gemini-pro").unwrap().api_model, "gemini-2.5-pro");
        assert_eq!(
            resolve_model("gemini-1.5-flash").unwrap().api_model,
            "gemini-2.5-flash"
        );
    }

    #[test]
    fn unknown_model_is_fatal() {
        let err = resolve_model("gpt-7-ultra").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert!(err.to_string().contains("gpt-4o"));
    }

    #[test]
    fn ids_are_unique() {
        let mut ids = model_ids();
        let total = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }
}
