/// Ollama completion client (`/api/generate`, non-streaming).
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{GenerationError, GenerationParams, Generator, http_client, truncate_at_stop};
use crate::config::BackendConfig;

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<Tag>,
}

#[derive(Deserialize)]
struct Tag {
    name: String,
}

pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(cfg: &BackendConfig, model: &str) -> Result<Self, GenerationError> {
        Ok(Self {
            client: http_client(cfg)?,
            base_url: cfg.endpoint().to_string(),
            model: model.to_string(),
        })
    }
}

impl Generator for OllamaClient {
    fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, GenerationError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "num_predict": params.max_tokens,
                "temperature": params.temperature,
                "top_p": params.top_p,
                "stop": params.stop,
                "repeat_penalty": params.repetition_penalty,
            }
        });

        debug!(model = %self.model, prompt_len = prompt.len(), "requesting completion");

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| GenerationError::Unavailable(format!("{url}: {e}")))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            // Ollama answers 404 for models that were never pulled.
            return Err(GenerationError::UnknownModel(self.model.clone()));
        }
        if !status.is_success() {
            return Err(GenerationError::Unavailable(format!("bad status {status} from {url}")));
        }

        let parsed: GenerateResponse = resp
            .json()
            .map_err(|e| GenerationError::BadResponse(e.to_string()))?;
        Ok(truncate_at_stop(&parsed.response, &params.stop))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Locally pulled models (`/api/tags`).
pub fn list_models(cfg: &BackendConfig) -> Result<Vec<String>, GenerationError> {
    let url = format!("{}/api/tags", cfg.endpoint());
    let resp = http_client(cfg)?
        .get(&url)
        .send()
        .map_err(|e| GenerationError::Unavailable(format!("{url}: {e}")))?;
    if !resp.status().is_success() {
        return Err(GenerationError::Unavailable(format!(
            "bad status {} from {url}",
            resp.status()
        )));
    }
    let tags: TagsResponse = resp
        .json()
        .map_err(|e| GenerationError::BadResponse(e.to_string()))?;
    Ok(tags.models.into_iter().map(|t| t.name).collect())
}
