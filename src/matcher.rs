/// Best-section retrieval over a fixed topic set.
///
/// `resolve` tries cheap string checks first (exact label, then a label
/// introduced by a lead-in phrase) and only then embeds the query and scores
/// every topic by cosine similarity. The best score must reach the threshold;
/// on exact ties the topic listed first wins.
use std::borrow::Cow;
use std::sync::{Arc, OnceLock};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::config::MatcherConfig;
use crate::embedder::{Embedder, EmbedderError};
use crate::prompt::title_case;
use crate::topics::{TopicSection, TopicSet, normalize};

pub const DEFAULT_THRESHOLD: f32 = 0.3;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("embedding backend unavailable: {0}")]
    EmbeddingUnavailable(#[source] EmbedderError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum MatchResult {
    ExactMatch {
        label: String,
        content: String,
    },
    SemanticMatch {
        label: String,
        content: String,
        score: f32,
    },
    /// Nothing matched; carries the query exactly as received.
    NoMatch {
        raw_query: String,
    },
}

impl MatchResult {
    /// Matched label, if any.
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::ExactMatch { label, .. } | Self::SemanticMatch { label, .. } => Some(label),
            Self::NoMatch { .. } => None,
        }
    }

    fn exact(section: &TopicSection) -> Self {
        Self::ExactMatch {
            label: section.label.clone(),
            content: section.content.clone(),
        }
    }
}

/// Cosine similarity of two vectors, `None` when their lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }

    let dot = a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    Some(dot / (norm_a * norm_b + 1e-8))
}

pub struct SectionMatcher {
    topics: TopicSet,
    embedder: Arc<dyn Embedder>,
    threshold: f32,
    /// Normalized lead-in phrases.
    lead_ins: Vec<String>,
    /// Topic vectors in topic order; `None` re-embeds on every call.
    topic_cache: Option<OnceLock<Vec<Vec<f32>>>>,
}

impl SectionMatcher {
    /// Matcher with the default threshold, no lead-in phrases and no caching.
    pub fn new(topics: TopicSet, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            topics,
            embedder,
            threshold: DEFAULT_THRESHOLD,
            lead_ins: Vec::new(),
            topic_cache: None,
        }
    }

    pub fn from_config(topics: TopicSet, embedder: Arc<dyn Embedder>, cfg: &MatcherConfig) -> Self {
        Self::new(topics, embedder)
            .with_threshold(cfg.threshold)
            .with_lead_in_phrases(&cfg.lead_in_phrases)
            .with_topic_cache(cfg.cache_topic_embeddings)
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_lead_in_phrases<S: AsRef<str>>(mut self, phrases: &[S]) -> Self {
        self.lead_ins = phrases
            .iter()
            .map(|p| normalize(p.as_ref()))
            .filter(|p| !p.is_empty())
            .collect();
        self
    }

    #[must_use]
    pub fn with_topic_cache(mut self, enabled: bool) -> Self {
        self.topic_cache = enabled.then(OnceLock::new);
        self
    }

    pub fn topics(&self) -> &TopicSet {
        &self.topics
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Embed all topics now instead of on the first semantic lookup.
    ///
    /// No-op when caching is disabled. A failure leaves the cache empty.
    pub fn prime(&self) -> Result<(), MatchError> {
        if self.topic_cache.is_some() && !self.topics.is_empty() {
            self.topic_vectors()?;
        }
        Ok(())
    }

    /// Resolve `query` to a topic section.
    pub fn resolve(&self, query: &str) -> Result<MatchResult, MatchError> {
        if self.topics.is_empty() {
            return Ok(MatchResult::NoMatch {
                raw_query: query.to_string(),
            });
        }

        let normalized = normalize(query);

        if let Some(section) = self.topics.get(&normalized) {
            debug!(label = %section.label, "exact label match");
            return Ok(MatchResult::exact(section));
        }

        if let Some(section) = self.lead_in_match(&normalized) {
            debug!(label = %section.label, "lead-in phrase match");
            return Ok(MatchResult::exact(section));
        }

        self.semantic_match(query)
    }

    fn lead_in_match(&self, normalized: &str) -> Option<&TopicSection> {
        self.lead_ins.iter().find_map(|phrase| {
            let rest = normalized.strip_prefix(phrase.as_str())?;
            // Whole-word lead-in only.
            if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
                return None;
            }
            let subject = rest
                .trim()
                .trim_end_matches(['?', '.', '!'])
                .trim_end();
            if subject.is_empty() {
                return None;
            }
            self.topics.get(&title_case(subject))
        })
    }

    fn semantic_match(&self, query: &str) -> Result<MatchResult, MatchError> {
        let query_vec = self
            .embedder
            .embed(query)
            .map_err(MatchError::EmbeddingUnavailable)?;
        let topic_vecs = self.topic_vectors()?;

        let mut best: Option<(&TopicSection, f32)> = None;
        for (section, topic_vec) in self.topics.iter().zip(topic_vecs.iter()) {
            let score = cosine_similarity(&query_vec, topic_vec).ok_or_else(|| {
                MatchError::EmbeddingUnavailable(EmbedderError::InferenceFailed(format!(
                    "dimension mismatch: query {} vs topic {:?} {}",
                    query_vec.len(),
                    section.label,
                    topic_vec.len()
                )))
            })?;

            if score.is_nan() {
                debug!(label = %section.label, "skipping NaN similarity");
                continue;
            }
            // Strict comparison: the earlier topic keeps a tie.
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((section, score));
            }
        }

        match best {
            Some((section, score)) if score >= self.threshold => {
                debug!(label = %section.label, score, "semantic match");
                Ok(MatchResult::SemanticMatch {
                    label: section.label.clone(),
                    content: section.content.clone(),
                    score,
                })
            }
            best => {
                debug!(
                    best_score = best.map(|(_, s)| s),
                    threshold = self.threshold,
                    "no topic above threshold"
                );
                Ok(MatchResult::NoMatch {
                    raw_query: query.to_string(),
                })
            }
        }
    }

    fn topic_vectors(&self) -> Result<Cow<'_, [Vec<f32>]>, MatchError> {
        if let Some(cached) = self.topic_cache.as_ref().and_then(OnceLock::get) {
            return Ok(Cow::Borrowed(cached.as_slice()));
        }

        let texts: Vec<String> = self.topics.iter().map(TopicSection::embedding_text).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let vectors = self
            .embedder
            .embed_batch(&refs)
            .map_err(MatchError::EmbeddingUnavailable)?;

        if vectors.len() != self.topics.len() {
            return Err(MatchError::EmbeddingUnavailable(EmbedderError::InferenceFailed(
                format!(
                    "expected {} topic vectors, got {}",
                    self.topics.len(),
                    vectors.len()
                ),
            )));
        }

        if let Some(cache) = &self.topic_cache {
            let _ = cache.set(vectors.clone());
        }
        Ok(Cow::Owned(vectors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::mock::{MockEmbedder, StaticEmbedder};

    const MORTGAGE: &str = "tell me about my mortgage rate";
    const WEATHER: &str = "what's the weather today";

    fn bank_topics() -> TopicSet {
        TopicSet::from_pairs([("Loan", "Loan info..."), ("Savings", "Savings info...")]).unwrap()
    }

    /// Query/topic vectors scoring 0.45 (Loan) and 0.20 (Savings) for the
    /// mortgage question, and at most 0.12 for the weather one.
    fn bank_embedder() -> StaticEmbedder {
        let loan_y = (1.0f32 - 0.45 * 0.45).sqrt();
        let savings_z = (1.0f32 - 0.20 * 0.20).sqrt();
        let (wy, wz) = (0.12 / loan_y, 0.05 / savings_z);
        let ww = (1.0 - wy * wy - wz * wz).sqrt();

        StaticEmbedder::new()
            .with("Loan. Loan info...", vec![0.45, loan_y, 0.0, 0.0])
            .with("Savings. Savings info...", vec![0.20, 0.0, savings_z, 0.0])
            .with(MORTGAGE, vec![1.0, 0.0, 0.0, 0.0])
            .with(WEATHER, vec![0.0, wy, wz, ww])
    }

    fn matcher(embedder: StaticEmbedder) -> (SectionMatcher, Arc<StaticEmbedder>) {
        let embedder = Arc::new(embedder);
        let m = SectionMatcher::new(bank_topics(), embedder.clone())
            .with_lead_in_phrases(&["I want to know more about"]);
        (m, embedder)
    }

    #[test]
    fn test_exact_label_skips_embedding() {
        let (m, embedder) = matcher(StaticEmbedder::new());
        assert_eq!(
            m.resolve("Loan").unwrap(),
            MatchResult::ExactMatch {
                label: "Loan".to_string(),
                content: "Loan info...".to_string(),
            }
        );
        assert_eq!(m.resolve("  sAVINGS ").unwrap().label(), Some("Savings"));
        assert_eq!(embedder.calls(), 0);
    }

    #[test]
    fn test_exact_label_ignores_threshold() {
        let (m, _) = matcher(StaticEmbedder::new());
        let m = m.with_threshold(1.0);
        assert_eq!(m.resolve("loan").unwrap().label(), Some("Loan"));
    }

    #[test]
    fn test_lead_in_phrase() {
        let (m, embedder) = matcher(StaticEmbedder::new());
        let result = m.resolve("I want to know more about savings").unwrap();
        assert_eq!(
            result,
            MatchResult::ExactMatch {
                label: "Savings".to_string(),
                content: "Savings info...".to_string(),
            }
        );
        assert_eq!(
            m.resolve("i want to know more about LOAN?").unwrap().label(),
            Some("Loan")
        );
        assert_eq!(embedder.calls(), 0);
    }

    #[test]
    fn test_lead_in_requires_word_boundary() {
        let embedder = StaticEmbedder::new()
            .with("Loan. Loan info...", vec![1.0, 0.0])
            .with("Savings. Savings info...", vec![0.0, 1.0])
            .with("i want to know more aboutloan", vec![-1.0, 0.0]);
        let (m, _) = matcher(embedder);
        assert!(matches!(
            m.resolve("i want to know more aboutloan").unwrap(),
            MatchResult::NoMatch { .. }
        ));
    }

    #[test]
    fn test_lead_in_disabled_by_default() {
        let embedder = Arc::new(StaticEmbedder::new());
        let m = SectionMatcher::new(bank_topics(), embedder.clone());
        // Falls through to embedding, which this table cannot serve.
        assert!(m.resolve("I want to know more about savings").is_err());
        assert_eq!(embedder.calls(), 1);
    }

    #[test]
    fn test_semantic_match_picks_argmax() {
        let (m, _) = matcher(bank_embedder());
        match m.resolve(MORTGAGE).unwrap() {
            MatchResult::SemanticMatch { label, content, score } => {
                assert_eq!(label, "Loan");
                assert_eq!(content, "Loan info...");
                assert!((score - 0.45).abs() < 1e-5, "score {score}");
            }
            other => panic!("expected semantic match, got {other:?}"),
        }
    }

    #[test]
    fn test_below_threshold_returns_raw_query() {
        let (m, _) = matcher(bank_embedder());
        let result = m.resolve(WEATHER).unwrap();
        assert_eq!(
            result,
            MatchResult::NoMatch {
                raw_query: WEATHER.to_string()
            }
        );
    }

    #[test]
    fn test_no_match_keeps_original_text() {
        let raw = "  What's The WEATHER  ";
        let embedder = StaticEmbedder::new()
            .with("Loan. Loan info...", vec![1.0, 0.0])
            .with("Savings. Savings info...", vec![1.0, 0.0])
            .with(raw, vec![0.0, 1.0]);
        let (m, _) = matcher(embedder);
        assert_eq!(
            m.resolve(raw).unwrap(),
            MatchResult::NoMatch {
                raw_query: raw.to_string()
            }
        );
    }

    #[test]
    fn test_score_equal_to_threshold_matches() {
        let query = vec![1.0, 0.0];
        let loan = vec![3.0, 4.0];
        let exact_score = cosine_similarity(&query, &loan).unwrap();

        let embedder = StaticEmbedder::new()
            .with("Loan. Loan info...", loan)
            .with("Savings. Savings info...", vec![0.0, 1.0])
            .with("borrowing", query);
        let (m, _) = matcher(embedder);
        let m = m.with_threshold(exact_score);

        assert_eq!(m.resolve("borrowing").unwrap().label(), Some("Loan"));

        let m = m.with_threshold(exact_score + 1e-6);
        assert!(matches!(
            m.resolve("borrowing").unwrap(),
            MatchResult::NoMatch { .. }
        ));
    }

    #[test]
    fn test_ties_go_to_first_topic() {
        let topics = TopicSet::from_pairs([("Savings", "same"), ("Loan", "same")]).unwrap();
        let embedder = Arc::new(
            StaticEmbedder::new()
                .with("Savings. same", vec![0.6, 0.8])
                .with("Loan. same", vec![0.6, 0.8])
                .with("money", vec![1.0, 0.0]),
        );
        let m = SectionMatcher::new(topics, embedder);
        assert_eq!(m.resolve("money").unwrap().label(), Some("Savings"));
    }

    #[test]
    fn test_empty_topics_is_no_match() {
        let embedder = Arc::new(StaticEmbedder::new());
        let m = SectionMatcher::new(TopicSet::default(), embedder.clone());
        assert_eq!(
            m.resolve("Loan").unwrap(),
            MatchResult::NoMatch {
                raw_query: "Loan".to_string()
            }
        );
        assert_eq!(embedder.calls(), 0);
    }

    #[test]
    fn test_embedding_failure_is_reported() {
        let (m, _) = matcher(StaticEmbedder::new());
        let err = m.resolve("how do mortgages work").unwrap_err();
        assert!(matches!(err, MatchError::EmbeddingUnavailable(_)));
    }

    #[test]
    fn test_dimension_mismatch_is_reported() {
        let embedder = StaticEmbedder::new()
            .with("Loan. Loan info...", vec![1.0, 0.0])
            .with("Savings. Savings info...", vec![1.0, 0.0])
            .with("q", vec![1.0, 0.0, 0.0]);
        let (m, _) = matcher(embedder);
        assert!(matches!(
            m.resolve("q"),
            Err(MatchError::EmbeddingUnavailable(_))
        ));
    }

    #[test]
    fn test_idempotent() {
        let (m, _) = matcher(bank_embedder());
        let first = m.resolve(MORTGAGE).unwrap();
        let second = m.resolve(MORTGAGE).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_cache_embeds_topics_once() {
        let (m, embedder) = matcher(bank_embedder());
        let m = m.with_topic_cache(true);

        m.prime().unwrap();
        assert_eq!(embedder.calls(), 2);

        m.resolve(MORTGAGE).unwrap();
        m.resolve(WEATHER).unwrap();
        // Two topics once, then one query embedding per call.
        assert_eq!(embedder.calls(), 4);
    }

    #[test]
    fn test_cached_and_uncached_agree() {
        let embedder: Arc<dyn Embedder> = Arc::new(MockEmbedder::new(32));
        let topics = TopicSet::from_pairs([
            ("Loan", "Borrow money for a house or a car."),
            ("Savings", "Put money aside and earn interest."),
            ("ATM", "Withdraw cash at any of our machines."),
        ])
        .unwrap();
        let plain = SectionMatcher::new(topics.clone(), embedder.clone()).with_threshold(-1.0);
        let cached = SectionMatcher::new(topics, embedder)
            .with_threshold(-1.0)
            .with_topic_cache(true);

        for query in ["how much interest", "cash machine", "house loan"] {
            assert_eq!(plain.resolve(query).unwrap(), cached.resolve(query).unwrap());
        }
    }

    #[test]
    fn test_failed_prime_leaves_cache_empty() {
        let (m, embedder) = matcher(StaticEmbedder::new());
        let m = m.with_topic_cache(true);
        assert!(m.prime().is_err());
        assert!(m.prime().is_err());
        // Each attempt re-embeds the first topic before failing.
        assert_eq!(embedder.calls(), 2);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]).unwrap() - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap().abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-2.0, 0.0]).unwrap() + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), Some(0.0));
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), None);
    }

    #[test]
    fn test_result_serializes_with_kind() {
        let json = serde_json::to_value(MatchResult::NoMatch {
            raw_query: "hi".to_string(),
        })
        .unwrap();
        assert_eq!(json["kind"], "NoMatch");
        assert_eq!(json["raw_query"], "hi");
    }
}
