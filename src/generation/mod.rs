/// Text-generation backends.
///
/// A backend takes a prompt plus sampling parameters and returns the
/// completion text. Implementations talk to a local inference server over
/// HTTP; `MockGenerator` answers deterministically for tests.
pub mod mock;
pub mod ollama;
pub mod openai;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::config::{BackendConfig, GenerationBackend};

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("generation backend unavailable: {0}")]
    Unavailable(String),

    #[error("unexpected response from generation backend: {0}")]
    BadResponse(String),

    #[error("unknown model: {0}")]
    UnknownModel(String),
}

/// Sampling parameters sent with every completion request.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenerationParams {
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
    pub temperature: f32,
    /// Nucleus-sampling probability mass.
    pub top_p: f32,
    /// The completion is cut at the first of these.
    pub stop: Vec<String>,
    /// 1.0 disables the penalty.
    pub repetition_penalty: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 200,
            temperature: 0.7,
            top_p: 0.95,
            stop: Vec::new(),
            repetition_penalty: 1.0,
        }
    }
}

/// Trait for text generation implementations.
pub trait Generator: Send + Sync {
    fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, GenerationError>;

    /// Identifier of the model this handle talks to.
    fn model_id(&self) -> &str;
}

/// Connect to `model_id` on the configured backend.
///
/// HTTP backends are lazy: nothing is sent until the first request.
pub fn connect(cfg: &BackendConfig, model_id: &str) -> Result<Arc<dyn Generator>, GenerationError> {
    if model_id.trim().is_empty() {
        return Err(GenerationError::UnknownModel("empty model id".to_string()));
    }
    let generator: Arc<dyn Generator> = match cfg.backend {
        GenerationBackend::OpenAi => Arc::new(openai::OpenAiClient::new(cfg, model_id)?),
        GenerationBackend::Ollama => Arc::new(ollama::OllamaClient::new(cfg, model_id)?),
        GenerationBackend::Mock => Arc::new(mock::MockGenerator::new(model_id)),
    };
    Ok(generator)
}

/// Models the backend reports as ready to serve.
///
/// Falls back to the configured `models` list (plus the default model) when
/// the backend offers no listing, as the mock backend does.
pub fn list_models(cfg: &BackendConfig) -> Result<Vec<String>, GenerationError> {
    let listed = match cfg.backend {
        GenerationBackend::OpenAi => openai::list_loaded_models(cfg)?,
        GenerationBackend::Ollama => ollama::list_models(cfg)?,
        GenerationBackend::Mock => Vec::new(),
    };
    if !listed.is_empty() {
        return Ok(listed);
    }
    Ok(configured_models(cfg))
}

/// The configured `models` list with the default model in front when missing.
pub fn configured_models(cfg: &BackendConfig) -> Vec<String> {
    let mut models = cfg.models.clone();
    if !models.contains(&cfg.default_model) {
        models.insert(0, cfg.default_model.clone());
    }
    models
}

/// Check that the backend can serve `model_id`.
///
/// Uses the backend's own listing, or the configured models when the
/// backend cannot be reached. Ollama tags match with or without `:latest`.
pub fn ensure_available(cfg: &BackendConfig, model_id: &str) -> Result<(), GenerationError> {
    let model_id = model_id.trim();
    if model_id.is_empty() {
        return Err(GenerationError::UnknownModel("empty model id".to_string()));
    }

    let available = list_models(cfg).unwrap_or_else(|e| {
        warn!("Model listing unavailable, checking against configured models: {e}");
        configured_models(cfg)
    });

    let known = available
        .iter()
        .any(|m| m == model_id || m.strip_suffix(":latest") == Some(model_id));
    if known {
        Ok(())
    } else {
        Err(GenerationError::UnknownModel(format!(
            "{model_id} (available: {})",
            available.join(", ")
        )))
    }
}

/// Cut `text` at the earliest occurrence of any stop sequence and trim it.
pub fn truncate_at_stop(text: &str, stop: &[String]) -> String {
    let end = stop
        .iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| text.find(s.as_str()))
        .min()
        .unwrap_or(text.len());
    text[..end].trim().to_string()
}

pub(crate) fn http_client(cfg: &BackendConfig) -> Result<reqwest::blocking::Client, GenerationError> {
    reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
        .user_agent(concat!("topicdesk/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| GenerationError::Unavailable(format!("HTTP client build failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stops(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_truncate_at_earliest_stop() {
        let text = " Sure thing.\nUser: and then\nAssistant: more";
        assert_eq!(
            truncate_at_stop(text, &stops(&["Assistant:", "User:"])),
            "Sure thing."
        );
    }

    #[test]
    fn test_truncate_without_stops() {
        assert_eq!(truncate_at_stop("  hello  ", &[]), "hello");
        assert_eq!(truncate_at_stop("hello", &stops(&[""])), "hello");
    }

    #[test]
    fn test_connect_rejects_empty_model() {
        let cfg = BackendConfig::default();
        assert!(matches!(
            connect(&cfg, "  "),
            Err(GenerationError::UnknownModel(_))
        ));
    }

    #[test]
    fn test_list_models_mock_uses_config() {
        let cfg = BackendConfig {
            backend: GenerationBackend::Mock,
            default_model: "tiny".to_string(),
            models: vec!["small".to_string(), "large".to_string()],
            ..BackendConfig::default()
        };
        assert_eq!(list_models(&cfg).unwrap(), vec!["tiny", "small", "large"]);
    }

    #[test]
    fn test_ensure_available_checks_listing() {
        let cfg = BackendConfig {
            backend: GenerationBackend::Mock,
            default_model: "tiny".to_string(),
            models: vec!["llama3:latest".to_string()],
            ..BackendConfig::default()
        };
        assert!(ensure_available(&cfg, "tiny").is_ok());
        assert!(ensure_available(&cfg, "llama3").is_ok());
        assert!(ensure_available(&cfg, "llama3:latest").is_ok());
        assert!(matches!(
            ensure_available(&cfg, "typo"),
            Err(GenerationError::UnknownModel(_))
        ));
        assert!(matches!(
            ensure_available(&cfg, " "),
            Err(GenerationError::UnknownModel(_))
        ));
    }

    #[test]
    fn test_ensure_available_offline_uses_configured_models() {
        // Nothing listens on port 9, so the listing request fails.
        let cfg = BackendConfig {
            base_url: Some("http://127.0.0.1:9".to_string()),
            default_model: "real-model".to_string(),
            models: vec!["other-model".to_string()],
            timeout_secs: 2,
            ..BackendConfig::default()
        };
        assert!(ensure_available(&cfg, "real-model").is_ok());
        assert!(ensure_available(&cfg, "other-model").is_ok());
        let err = ensure_available(&cfg, "typo-model").unwrap_err();
        assert!(matches!(err, GenerationError::UnknownModel(_)));
        assert!(err.to_string().contains("real-model"));
    }

    #[test]
    fn test_partial_params_fill_defaults() {
        let params: GenerationParams = serde_json::from_str(r#"{"max_tokens": 50}"#).unwrap();
        assert_eq!(params.max_tokens, 50);
        assert_eq!(params.top_p, 0.95);
    }
}
