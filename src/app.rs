/// Startup wiring: config → topics, embedder, matcher, inference context, desk.
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{info, warn};

use crate::config::Config;
use crate::context::InferenceContext;
use crate::desk::Desk;
use crate::embedder::{self, Embedder};
use crate::matcher::SectionMatcher;
use crate::topics::TopicSet;

/// The configured persona, or a random pick from `persona_names`.
pub fn pick_persona(cfg: &Config, rng: &mut impl Rng) -> String {
    if let Some(name) = cfg.persona.as_deref().filter(|n| !n.trim().is_empty()) {
        return name.to_string();
    }
    cfg.persona_names
        .choose(rng)
        .cloned()
        .unwrap_or_else(|| "Assistant (AI)".to_string())
}

/// Topic set plus matcher, primed when caching is on.
pub fn build_matcher(cfg: &Config, embedder: Arc<dyn Embedder>) -> Result<SectionMatcher> {
    let topics = TopicSet::load(Path::new(&cfg.topics_path))
        .with_context(|| format!("failed to load topics from {}", cfg.topics_path))?;
    let matcher = SectionMatcher::from_config(topics, embedder, &cfg.matcher);

    // A cold cache is retried on first use, so this only logs.
    if let Err(e) = matcher.prime() {
        warn!("Could not precompute topic embeddings: {e}");
    }
    Ok(matcher)
}

/// Build the help desk from configuration.
///
/// `model` overrides `generation.default_model`.
pub fn build_desk(cfg: &Config, persona: String, model: Option<&str>) -> Result<Desk> {
    let embedder = embedder::from_config(&cfg.embedding).context("failed to load embedding backend")?;
    let matcher = build_matcher(cfg, embedder)?;

    let model = model.unwrap_or(cfg.generation.default_model.as_str());
    let context = InferenceContext::from_config(&cfg.generation, model)
        .context("failed to connect generation backend")?;

    info!("{persona} ready with {} topics", matcher.topics().len());
    Ok(Desk::new(
        persona,
        matcher,
        Arc::new(context),
        cfg.desk.clone(),
        cfg.matcher.on_embedding_error,
    ))
}
