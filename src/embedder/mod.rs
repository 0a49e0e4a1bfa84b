/// Embedder trait and shared types for text embedding.
///
/// Backends: local ONNX sentence-embedding model, Ollama embeddings
/// endpoint, and deterministic mocks for tests and offline runs.
pub mod download;
pub mod mock;
pub mod ollama;
pub mod onnx;
pub mod tokenizer;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use crate::config::{EmbeddingBackend, EmbeddingConfig};

/// Errors that can occur during embedding operations.
#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("model load failed: {0}")]
    ModelLoadFailed(String),

    #[error("tokenizer error: {0}")]
    TokenizerError(String),

    #[error("embedding request failed: {0}")]
    RequestFailed(String),
}

/// Trait for text embedding implementations.
///
/// All implementations must be `Send + Sync` to allow concurrent use
/// behind `Arc`.
pub trait Embedder: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// Embed multiple text strings into vectors.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Return the dimensionality of the embedding vectors.
    fn dimensions(&self) -> usize;
}

/// Build the embedding backend named in the configuration.
pub fn from_config(cfg: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, EmbedderError> {
    match cfg.backend {
        EmbeddingBackend::Onnx => {
            let model_dir = Path::new(&cfg.model_dir);
            if cfg.auto_download && !download::all_files_present(model_dir) {
                download::download_model_files(model_dir, &cfg.name)
                    .map_err(|e| EmbedderError::ModelLoadFailed(format!("{e:#}")))?;
            }
            let embedder = onnx::OnnxEmbedder::new(model_dir, cfg.dimensions)?;
            Ok(Arc::new(embedder))
        }
        EmbeddingBackend::Ollama => {
            info!("Using Ollama embeddings ({}) at {}", cfg.model, cfg.base_url);
            let embedder = ollama::OllamaEmbedder::new(
                &cfg.base_url,
                &cfg.model,
                cfg.dimensions,
                Duration::from_secs(cfg.timeout_secs),
            )?;
            Ok(Arc::new(embedder))
        }
        EmbeddingBackend::Mock => {
            info!("Using mock embedder ({} dimensions)", cfg.dimensions);
            Ok(Arc::new(mock::MockEmbedder::new(cfg.dimensions)))
        }
    }
}
