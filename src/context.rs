/// The active generation backend, swappable at runtime.
///
/// Callers hold an `Arc<InferenceContext>`; `reload` replaces the backend
/// handle under a write lock while in-flight requests finish on the handle
/// they already cloned.
use std::sync::{Arc, RwLock};

use tracing::info;

use crate::config::BackendConfig;
use crate::generation::{self, GenerationError, GenerationParams, Generator};

/// Builds a backend handle for a model id.
pub type Connector =
    Box<dyn Fn(&str) -> Result<Arc<dyn Generator>, GenerationError> + Send + Sync>;

pub struct InferenceContext {
    active: RwLock<Arc<dyn Generator>>,
    connector: Connector,
}

impl InferenceContext {
    /// Context over the configured backend kind and URL.
    ///
    /// The startup model is connected as given. Later `reload` targets must
    /// appear in the backend's model listing (or the configured `models`
    /// when the backend cannot list).
    pub fn from_config(cfg: &BackendConfig, model_id: &str) -> Result<Self, GenerationError> {
        let generator = generation::connect(cfg, model_id)?;
        info!("Generation model: {}", generator.model_id());

        let cfg = cfg.clone();
        let connector: Connector = Box::new(move |model: &str| {
            generation::ensure_available(&cfg, model)?;
            generation::connect(&cfg, model)
        });
        Ok(Self {
            active: RwLock::new(generator),
            connector,
        })
    }

    /// Wrap an existing handle; `reload` accepts only that handle's model id.
    pub fn fixed(generator: Arc<dyn Generator>) -> Self {
        let only = generator.clone();
        let connector: Connector = Box::new(move |model: &str| {
            if model == only.model_id() {
                Ok(only.clone())
            } else {
                Err(GenerationError::UnknownModel(model.to_string()))
            }
        });
        Self {
            active: RwLock::new(generator),
            connector,
        }
    }

    fn current(&self) -> Arc<dyn Generator> {
        match self.active.read() {
            Ok(guard) => guard.clone(),
            // The guarded value is a plain Arc swap, never left half-written.
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn model_id(&self) -> String {
        self.current().model_id().to_string()
    }

    pub fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, GenerationError> {
        self.current().generate(prompt, params)
    }

    /// Switch to `model_id`. On failure the previous backend stays active.
    pub fn reload(&self, model_id: &str) -> Result<(), GenerationError> {
        let generator = (self.connector)(model_id)?;
        let previous = {
            let mut active = match self.active.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            std::mem::replace(&mut *active, generator)
        };
        info!("Switched generation model {} -> {model_id}", previous.model_id());
        Ok(())
    }
}
