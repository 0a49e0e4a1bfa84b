/// Configuration module for topicdesk.
///
/// Handles loading, validating, and providing default configuration values.
/// Every field has a default; unknown keys and out-of-range values are
/// rejected at load time instead of surfacing later as a missing key.
use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::generation::GenerationParams;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

// ── Default value functions ──────────────────────────────────────────

fn default_topics_path() -> String {
    "topics.json".to_string()
}

fn default_persona_names() -> Vec<String> {
    ["Alan (AI)", "Alice (AI)", "Alex (AI)"]
        .map(String::from)
        .to_vec()
}

fn default_threshold() -> f32 {
    0.3
}

fn default_lead_in_phrases() -> Vec<String> {
    vec!["I want to know more about".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_greeting_phrases() -> Vec<String> {
    [
        "hi",
        "hello",
        "hey",
        "help",
        "can you help me",
        "i need help",
    ]
    .map(String::from)
    .to_vec()
}

fn default_domain_keywords() -> Vec<String> {
    [
        "credit",
        "card",
        "mortgage",
        "saving",
        "loan",
        "bank",
        "deposit",
        "withdraw",
        "interest",
        "finance",
        "investment",
        "branch",
        "location",
        "address",
        "atm",
        "online banking",
        "account opening",
        "loan application",
    ]
    .map(String::from)
    .to_vec()
}

fn default_refusal_message() -> String {
    "I'm sorry, I can only answer bank-related questions.".to_string()
}

fn default_user_name() -> String {
    "User".to_string()
}

fn default_desk_generation() -> GenerationParams {
    GenerationParams {
        max_tokens: 100,
        temperature: 0.5,
        top_p: 1.0,
        stop: Vec::new(),
        repetition_penalty: 1.3,
    }
}

fn default_system_prompt() -> String {
    "You are a helpful and concise AI assistant.".to_string()
}

fn default_history_window() -> usize {
    8
}

fn default_assistant_generation() -> GenerationParams {
    GenerationParams {
        max_tokens: 200,
        temperature: 0.7,
        top_p: 0.95,
        stop: ["User:", "Assistant:", "[System]:"]
            .map(String::from)
            .to_vec(),
        repetition_penalty: 1.0,
    }
}

fn default_model() -> String {
    "llama-3.2-1b-instruct".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_embedding_timeout_secs() -> u64 {
    30
}

fn default_embedding_name() -> String {
    "all-MiniLM-L6-v2".to_string()
}

fn default_dimensions() -> usize {
    384
}

fn default_model_dir() -> String {
    "models/all-MiniLM-L6-v2".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_embedding_model() -> String {
    "all-minilm".to_string()
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// JSON object mapping topic label → section content.
    #[serde(default = "default_topics_path")]
    pub topics_path: String,

    /// Fixed persona name. When absent, one of `persona_names` is picked at startup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,

    #[serde(default = "default_persona_names")]
    pub persona_names: Vec<String>,

    #[serde(default)]
    pub matcher: MatcherConfig,

    #[serde(default)]
    pub desk: DeskConfig,

    #[serde(default)]
    pub assistant: AssistantConfig,

    #[serde(default)]
    pub generation: BackendConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

/// What the desk does when the embedding backend fails during resolution.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingErrorPolicy {
    /// Answer from the raw query as if no topic matched.
    #[default]
    Fallback,
    /// Fail the turn.
    Abort,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MatcherConfig {
    /// Minimum cosine similarity for a semantic match (inclusive).
    #[serde(default = "default_threshold")]
    pub threshold: f32,

    /// Openings such as "I want to know more about" whose remainder is tried as a label.
    #[serde(default = "default_lead_in_phrases")]
    pub lead_in_phrases: Vec<String>,

    #[serde(default = "default_true")]
    pub cache_topic_embeddings: bool,

    #[serde(default)]
    pub on_embedding_error: EmbeddingErrorPolicy,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DeskConfig {
    #[serde(default = "default_greeting_phrases")]
    pub greeting_phrases: Vec<String>,

    /// Substrings one of which must occur in a question. Empty disables the gate.
    #[serde(default = "default_domain_keywords")]
    pub domain_keywords: Vec<String>,

    #[serde(default = "default_refusal_message")]
    pub refusal_message: String,

    #[serde(default = "default_user_name")]
    pub default_user_name: String,

    /// Prefix the reply with the prompt, like a causal LM decode of the full sequence.
    #[serde(default = "default_true")]
    pub echo_prompt: bool,

    #[serde(default = "default_desk_generation")]
    pub generation: GenerationParams,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct AssistantConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Number of most recent turns sent along with the system prompt.
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    #[serde(default = "default_assistant_generation")]
    pub generation: GenerationParams,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GenerationBackend {
    /// OpenAI-compatible completion server (LM Studio, llama.cpp server, vLLM).
    #[default]
    OpenAi,
    Ollama,
    Mock,
}

impl GenerationBackend {
    /// Where each server listens out of the box.
    pub fn default_url(self) -> &'static str {
        match self {
            Self::OpenAi => "http://localhost:1234",
            Self::Ollama => "http://localhost:11434",
            Self::Mock => "",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    #[serde(default)]
    pub backend: GenerationBackend,

    /// Server URL; unset means the backend's usual local port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "default_model")]
    pub default_model: String,

    /// Known model ids offered for selection when the backend cannot list them.
    #[serde(default)]
    pub models: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    #[default]
    Onnx,
    Ollama,
    Mock,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub backend: EmbeddingBackend,

    /// sentence-transformers model name, used for downloads.
    #[serde(default = "default_embedding_name")]
    pub name: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    #[serde(default = "default_model_dir")]
    pub model_dir: String,

    #[serde(default = "default_true")]
    pub auto_download: bool,

    /// Ollama server, for `backend = "ollama"`.
    #[serde(default = "default_ollama_url")]
    pub base_url: String,

    /// Ollama embedding model, for `backend = "ollama"`.
    #[serde(default = "default_ollama_embedding_model")]
    pub model: String,

    /// Request timeout for `backend = "ollama"`.
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            topics_path: default_topics_path(),
            persona: None,
            persona_names: default_persona_names(),
            matcher: MatcherConfig::default(),
            desk: DeskConfig::default(),
            assistant: AssistantConfig::default(),
            generation: BackendConfig::default(),
            embedding: EmbeddingConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            lead_in_phrases: default_lead_in_phrases(),
            cache_topic_embeddings: true,
            on_embedding_error: EmbeddingErrorPolicy::default(),
        }
    }
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            greeting_phrases: default_greeting_phrases(),
            domain_keywords: default_domain_keywords(),
            refusal_message: default_refusal_message(),
            default_user_name: default_user_name(),
            echo_prompt: true,
            generation: default_desk_generation(),
        }
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            history_window: default_history_window(),
            generation: default_assistant_generation(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            backend: GenerationBackend::default(),
            base_url: None,
            default_model: default_model(),
            models: Vec::new(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl BackendConfig {
    /// Configured `base_url` without a trailing slash, or the backend default.
    pub fn endpoint(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or(self.backend.default_url())
            .trim_end_matches('/')
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::default(),
            name: default_embedding_name(),
            dimensions: default_dimensions(),
            model_dir: default_model_dir(),
            auto_download: true,
            base_url: default_ollama_url(),
            model: default_ollama_embedding_model(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load and validate configuration from a JSON file.
    ///
    /// A missing `config.json` (the default path) is created from defaults;
    /// any other missing path is an error. Malformed JSON, unknown keys and
    /// invalid values fail fast.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            DEFAULT_CONFIG_PATH
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            anyhow::ensure!(
                path == DEFAULT_CONFIG_PATH,
                "config file not found: {path}"
            );

            info!("{path} not found, using defaults");
            let cfg = Self::default();
            match cfg.save(path) {
                Ok(()) => info!("Generated config template: {path}"),
                Err(e) => warn!("Failed to generate config template: {e:#}"),
            }
            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;
        let cfg = Self::from_json(&data).with_context(|| format!("invalid config: {path}"))?;

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Parse and validate a JSON document.
    pub fn from_json(data: &str) -> Result<Self> {
        let cfg: Config = serde_json::from_str(data).context("failed to parse config JSON")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.topics_path.is_empty(), "topics_path must not be empty");
        anyhow::ensure!(
            self.persona.is_some() || !self.persona_names.is_empty(),
            "either persona or a non-empty persona_names list is required"
        );
        anyhow::ensure!(
            (-1.0..=1.0).contains(&self.matcher.threshold),
            "matcher.threshold must be within [-1, 1], got {}",
            self.matcher.threshold
        );
        anyhow::ensure!(
            self.matcher.lead_in_phrases.iter().all(|p| !p.trim().is_empty()),
            "matcher.lead_in_phrases must not contain blank phrases"
        );
        anyhow::ensure!(
            !self.desk.default_user_name.trim().is_empty(),
            "desk.default_user_name must not be empty"
        );
        anyhow::ensure!(
            self.assistant.history_window > 0,
            "assistant.history_window must be positive"
        );
        validate_params("desk.generation", &self.desk.generation)?;
        validate_params("assistant.generation", &self.assistant.generation)?;

        anyhow::ensure!(
            self.generation.base_url.as_deref().is_none_or(|url| !url.trim().is_empty()),
            "generation.base_url must not be empty"
        );
        anyhow::ensure!(
            !self.generation.default_model.is_empty(),
            "generation.default_model must not be empty"
        );
        anyhow::ensure!(
            self.generation.timeout_secs > 0,
            "generation.timeout_secs must be positive"
        );

        anyhow::ensure!(
            self.embedding.dimensions > 0,
            "embedding.dimensions must be positive"
        );
        if self.embedding.backend == EmbeddingBackend::Ollama {
            anyhow::ensure!(
                !self.embedding.base_url.is_empty(),
                "embedding.base_url must not be empty"
            );
            anyhow::ensure!(
                self.embedding.timeout_secs > 0,
                "embedding.timeout_secs must be positive"
            );
        }

        self.server
            .bind
            .parse::<SocketAddr>()
            .with_context(|| format!("server.bind is not a socket address: {}", self.server.bind))?;

        Ok(())
    }
}

fn validate_params(section: &str, params: &GenerationParams) -> Result<()> {
    anyhow::ensure!(params.max_tokens > 0, "{section}.max_tokens must be positive");
    anyhow::ensure!(
        params.temperature >= 0.0,
        "{section}.temperature must not be negative"
    );
    anyhow::ensure!(
        params.top_p > 0.0 && params.top_p <= 1.0,
        "{section}.top_p must be within (0, 1]"
    );
    anyhow::ensure!(
        params.repetition_penalty > 0.0,
        "{section}.repetition_penalty must be positive"
    );
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────────
