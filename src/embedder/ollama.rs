/// Embeddings served by a local Ollama instance (`/api/embeddings`).
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;

use super::{Embedder, EmbedderError};

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

pub struct OllamaEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: usize,
}

impl OllamaEmbedder {
    pub fn new(
        base_url: &str,
        model: &str,
        dimensions: usize,
        timeout: Duration,
    ) -> Result<Self, EmbedderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("HTTP client build failed: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/api/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            dimensions,
        })
    }
}

impl Embedder for OllamaEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "model": self.model, "prompt": text }))
            .send()
            .map_err(|e| EmbedderError::RequestFailed(format!("{}: {e}", self.endpoint)))?;

        if !resp.status().is_success() {
            return Err(EmbedderError::RequestFailed(format!(
                "bad status {} from {}",
                resp.status(),
                self.endpoint
            )));
        }

        let body: EmbeddingResponse = resp
            .json()
            .map_err(|e| EmbedderError::InferenceFailed(format!("malformed embedding response: {e}")))?;

        if body.embedding.len() != self.dimensions {
            return Err(EmbedderError::InferenceFailed(format!(
                "model {} returned {} dimensions, expected {}",
                self.model,
                body.embedding.len(),
                self.dimensions
            )));
        }

        Ok(body.embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
