/// Deterministic generator for tests and offline runs.
use std::sync::Mutex;

use super::{GenerationError, GenerationParams, Generator};

/// Replies with a fixed text (by default `"[{model}] ok"`) and records every
/// prompt it receives.
pub struct MockGenerator {
    model: String,
    reply: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl MockGenerator {
    #[must_use]
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            reply: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_reply(mut self, reply: &str) -> Self {
        self.reply = Some(reply.to_string());
        self
    }

    /// Prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl Generator for MockGenerator {
    fn generate(&self, prompt: &str, _params: &GenerationParams) -> Result<String, GenerationError> {
        self.prompts
            .lock()
            .map_err(|e| GenerationError::Unavailable(format!("lock poisoned: {e}")))?
            .push(prompt.to_string());

        Ok(self
            .reply
            .clone()
            .unwrap_or_else(|| format!("[{}] ok", self.model)))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
