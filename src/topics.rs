/// Topic sections: the fixed knowledge base the matcher resolves against.
///
/// Loaded once from a JSON object `{ "Label": "content", ... }`. File order
/// is kept; it is the tie-break order for semantic matching.
use std::collections::HashSet;
use std::path::Path;

use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

pub const PLACEHOLDER_LABEL: &str = "General";
const PLACEHOLDER_CONTENT: &str =
    "No bank content provided. (Please add your bank-related guidelines here.)";

#[derive(Error, Debug)]
pub enum TopicError {
    #[error("failed to read topic file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid topic file {path}: {reason}")]
    Invalid { path: String, reason: String },

    #[error("topic set is empty")]
    Empty,

    #[error("duplicate topic label (case-insensitive): {0}")]
    DuplicateLabel(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSection {
    pub label: String,
    pub content: String,
}

impl TopicSection {
    /// Text embedded for semantic matching: `"{label}. {content}"`.
    #[must_use]
    pub fn embedding_text(&self) -> String {
        format!("{}. {}", self.label, self.content)
    }
}

/// Ordered, read-only collection of topic sections with unique labels.
#[derive(Debug, Clone, Default)]
pub struct TopicSet {
    sections: Vec<TopicSection>,
}

/// Lowercased, trimmed form used for every label comparison.
pub(crate) fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

impl TopicSet {
    /// Build from `(label, content)` pairs in iteration order.
    ///
    /// Labels that collide case-insensitively are rejected. An empty input
    /// is allowed here; `load` is where an empty source is a configuration error.
    pub fn from_pairs<I, L, C>(pairs: I) -> Result<Self, TopicError>
    where
        I: IntoIterator<Item = (L, C)>,
        L: Into<String>,
        C: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut sections = Vec::new();

        for (label, content) in pairs {
            let label = label.into();
            if !seen.insert(normalize(&label)) {
                return Err(TopicError::DuplicateLabel(label));
            }
            sections.push(TopicSection {
                label,
                content: content.into(),
            });
        }

        Ok(Self { sections })
    }

    /// Load topics from a JSON file.
    ///
    /// A missing file yields the single placeholder topic `General`.
    pub fn load(path: &Path) -> Result<Self, TopicError> {
        let shown = path.display().to_string();

        if !path.exists() {
            warn!("{shown} not found, using placeholder topic {PLACEHOLDER_LABEL:?}");
            return Self::from_pairs([(PLACEHOLDER_LABEL, PLACEHOLDER_CONTENT)]);
        }

        let data = std::fs::read_to_string(path).map_err(|source| TopicError::Read {
            path: shown.clone(),
            source,
        })?;
        let topics = Self::from_json(&data).map_err(|e| match e {
            TopicError::Invalid { reason, .. } => TopicError::Invalid {
                path: shown.clone(),
                reason,
            },
            other => other,
        })?;

        info!("Loaded {} topics from {shown}", topics.len());
        Ok(topics)
    }

    /// Parse a JSON object of label → content strings.
    pub fn from_json(data: &str) -> Result<Self, TopicError> {
        let invalid = |reason: String| TopicError::Invalid {
            path: "<inline>".to_string(),
            reason,
        };

        let value: Value = serde_json::from_str(data).map_err(|e| invalid(e.to_string()))?;
        let Value::Object(map) = value else {
            return Err(invalid("expected a JSON object of label → content".to_string()));
        };

        let mut pairs = Vec::with_capacity(map.len());
        for (label, content) in map {
            let Value::String(content) = content else {
                return Err(invalid(format!("content of {label:?} is not a string")));
            };
            if label.trim().is_empty() {
                return Err(invalid("blank topic label".to_string()));
            }
            pairs.push((label, content));
        }

        let topics = Self::from_pairs(pairs)?;
        if topics.is_empty() {
            return Err(TopicError::Empty);
        }
        Ok(topics)
    }

    /// Case-insensitive label lookup.
    pub fn get(&self, label: &str) -> Option<&TopicSection> {
        let wanted = normalize(label);
        self.sections.iter().find(|s| normalize(&s.label) == wanted)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TopicSection> {
        self.sections.iter()
    }

    /// Labels in original casing and file order.
    pub fn labels(&self) -> Vec<&str> {
        self.sections.iter().map(|s| s.label.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}
