/// ONNX Runtime embedder using the `ort` crate.
///
/// Runs a sentence-transformers model (all-MiniLM-L6-v2 by default) exported
/// to ONNX, mean-pools the last hidden state over the attention mask and
/// L2-normalizes the result, which is what `SentenceTransformer.encode` does.
use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use tracing::{debug, info};

use super::tokenizer::BertTokenizer;
use super::{Embedder, EmbedderError};

/// ONNX-backed embedder implementing the `Embedder` trait.
///
/// The session is not shared across threads concurrently; calls are
/// serialized through the mutex.
pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: BertTokenizer,
    dimensions: usize,
}

impl OnnxEmbedder {
    /// Load `model.onnx` and `tokenizer.json` from `model_dir`.
    pub fn new(model_dir: &Path, dimensions: usize) -> Result<Self, EmbedderError> {
        let model_path = model_dir.join("model.onnx");

        if !model_path.exists() {
            return Err(EmbedderError::ModelLoadFailed(format!(
                "model.onnx not found in {} (run `topicdesk download`)",
                model_dir.display()
            )));
        }

        info!("Loading embedding model from {}", model_dir.display());

        let session = Session::builder()
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("session builder error: {e}")))?
            .with_intra_threads(4)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("thread config error: {e}")))?
            .commit_from_file(&model_path)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("model load error: {e}")))?;

        let tokenizer = BertTokenizer::from_model_dir(model_dir)
            .map_err(|e| EmbedderError::TokenizerError(format!("{e:#}")))?;

        info!(
            "Embedding model ready (vocab size: {}, {dimensions} dimensions)",
            tokenizer.vocab_size()
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimensions,
        })
    }
}

impl Embedder for OnnxEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let tokens = self
            .tokenizer
            .tokenize(text)
            .map_err(|e| EmbedderError::TokenizerError(format!("{e:#}")))?;

        let seq_len = tokens.input_ids.len();
        debug!(seq_len, "embedding text");

        // (shape, data) tuples keep us off ort's ndarray version
        let input_ids = Tensor::from_array(([1usize, seq_len], tokens.input_ids))
            .map_err(|e| EmbedderError::InferenceFailed(format!("input_ids error: {e}")))?;
        let attention_mask = Tensor::from_array(([1usize, seq_len], tokens.attention_mask.clone()))
            .map_err(|e| EmbedderError::InferenceFailed(format!("attention_mask error: {e}")))?;
        let token_type_ids = Tensor::from_array(([1usize, seq_len], vec![0i64; seq_len]))
            .map_err(|e| EmbedderError::InferenceFailed(format!("token_type_ids error: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| EmbedderError::InferenceFailed(format!("lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
                "token_type_ids" => token_type_ids,
            ])
            .map_err(|e| EmbedderError::InferenceFailed(format!("inference failed: {e}")))?;

        // last_hidden_state: [1, seq_len, hidden]
        let (_shape, hidden) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("output extraction: {e}")))?;

        if seq_len == 0 || hidden.len() != seq_len * self.dimensions {
            return Err(EmbedderError::InferenceFailed(format!(
                "unexpected output size {} for {seq_len} tokens x {} dimensions",
                hidden.len(),
                self.dimensions
            )));
        }

        let pooled = mean_pooling(hidden, &tokens.attention_mask, self.dimensions);
        Ok(l2_normalize(pooled))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Average the token vectors whose attention mask is set.
///
/// `hidden` is the flattened `[seq_len, hidden_size]` block of one sequence.
fn mean_pooling(hidden: &[f32], attention_mask: &[i64], hidden_size: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; hidden_size];
    let mut counted = 0.0f32;

    for (token, row) in hidden.chunks_exact(hidden_size).enumerate() {
        let weight = attention_mask.get(token).copied().unwrap_or(0) as f32;
        if weight == 0.0 {
            continue;
        }
        counted += weight;
        for (acc, v) in pooled.iter_mut().zip(row) {
            *acc += v * weight;
        }
    }

    if counted > 0.0 {
        for v in &mut pooled {
            *v /= counted;
        }
    }

    pooled
}

fn l2_normalize(mut vec: Vec<f32>) -> Vec<f32> {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vec {
            *v /= norm;
        }
    }
    vec
}
