/// OpenAI-compatible completion client (LM Studio, llama.cpp server, vLLM).
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{GenerationError, GenerationParams, Generator, http_client, truncate_at_stop};
use crate::config::BackendConfig;

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    text: String,
}

/// LM Studio's native model listing (`/api/v0/models`).
#[derive(Deserialize)]
struct LmStudioModels {
    data: Vec<LmStudioModel>,
}

#[derive(Deserialize)]
struct LmStudioModel {
    id: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    state: String,
}

/// Standard `/v1/models` listing.
#[derive(Deserialize)]
struct OpenAiModels {
    data: Vec<OpenAiModel>,
}

#[derive(Deserialize)]
struct OpenAiModel {
    id: String,
}

pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiClient {
    pub fn new(cfg: &BackendConfig, model: &str) -> Result<Self, GenerationError> {
        Ok(Self {
            client: http_client(cfg)?,
            base_url: cfg.endpoint().to_string(),
            api_key: cfg.api_key.clone(),
            model: model.to_string(),
        })
    }
}

impl Generator for OpenAiClient {
    fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, GenerationError> {
        let url = format!("{}/v1/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "top_p": params.top_p,
            "stop": params.stop,
            "repeat_penalty": params.repetition_penalty,
            "stream": false,
        });

        debug!(model = %self.model, prompt_len = prompt.len(), "requesting completion");

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request
            .send()
            .map_err(|e| GenerationError::Unavailable(format!("{url}: {e}")))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(GenerationError::UnknownModel(self.model.clone()));
        }
        if !status.is_success() {
            return Err(GenerationError::Unavailable(format!("bad status {status} from {url}")));
        }

        let parsed: CompletionResponse = resp
            .json()
            .map_err(|e| GenerationError::BadResponse(e.to_string()))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GenerationError::BadResponse("no choices in completion".to_string()))?;

        Ok(truncate_at_stop(&choice.text, &params.stop))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Loaded LLMs, per LM Studio's `/api/v0/models`; plain `/v1/models` otherwise.
pub fn list_loaded_models(cfg: &BackendConfig) -> Result<Vec<String>, GenerationError> {
    let client = http_client(cfg)?;
    let base = cfg.endpoint();

    let native = format!("{base}/api/v0/models");
    let resp = client
        .get(&native)
        .send()
        .map_err(|e| GenerationError::Unavailable(format!("{native}: {e}")))?;

    if resp.status().is_success() {
        let listing: LmStudioModels = resp
            .json()
            .map_err(|e| GenerationError::BadResponse(e.to_string()))?;
        return Ok(loaded_llms(listing));
    }

    debug!("{native} returned {}, trying /v1/models", resp.status());
    let standard = format!("{base}/v1/models");
    let resp = client
        .get(&standard)
        .send()
        .map_err(|e| GenerationError::Unavailable(format!("{standard}: {e}")))?;
    if !resp.status().is_success() {
        return Err(GenerationError::Unavailable(format!(
            "bad status {} from {standard}",
            resp.status()
        )));
    }
    let listing: OpenAiModels = resp
        .json()
        .map_err(|e| GenerationError::BadResponse(e.to_string()))?;
    Ok(listing.data.into_iter().map(|m| m.id).collect())
}

fn loaded_llms(listing: LmStudioModels) -> Vec<String> {
    listing
        .data
        .into_iter()
        .filter(|m| m.state == "loaded" && m.kind == "llm")
        .map(|m| m.id)
        .collect()
}
