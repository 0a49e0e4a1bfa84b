/// Help-desk conversation flow.
///
/// One turn: greeting short-circuit, domain keyword gate, section
/// resolution, prompt, completion.
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::config::{DeskConfig, EmbeddingErrorPolicy};
use crate::context::InferenceContext;
use crate::matcher::{MatchResult, SectionMatcher};
use crate::prompt::desk_prompt;
use crate::topics::TopicSet;

pub struct Desk {
    persona: String,
    matcher: SectionMatcher,
    context: Arc<InferenceContext>,
    cfg: DeskConfig,
    on_embedding_error: EmbeddingErrorPolicy,
    greetings: Vec<String>,
    keywords: Vec<String>,
}

impl std::fmt::Debug for Desk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Desk")
            .field("persona", &self.persona)
            .field("topics", &self.matcher.topics().labels())
            .field("model", &self.context.model_id())
            .field("on_embedding_error", &self.on_embedding_error)
            .finish_non_exhaustive()
    }
}

impl Desk {
    pub fn new(
        persona: impl Into<String>,
        matcher: SectionMatcher,
        context: Arc<InferenceContext>,
        cfg: DeskConfig,
        on_embedding_error: EmbeddingErrorPolicy,
    ) -> Self {
        let lowered = |list: &[String]| -> Vec<String> {
            list.iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        };
        Self {
            persona: persona.into(),
            greetings: lowered(&cfg.greeting_phrases),
            keywords: lowered(&cfg.domain_keywords),
            matcher,
            context,
            cfg,
            on_embedding_error,
        }
    }

    pub fn persona(&self) -> &str {
        &self.persona
    }

    pub fn topics(&self) -> &TopicSet {
        self.matcher.topics()
    }

    pub fn matcher(&self) -> &SectionMatcher {
        &self.matcher
    }

    pub fn context(&self) -> &Arc<InferenceContext> {
        &self.context
    }

    /// Domain keywords, sorted, for display.
    pub fn keywords(&self) -> Vec<String> {
        let mut sorted = self.keywords.clone();
        sorted.sort();
        sorted
    }

    /// `name` trimmed, or the configured default when blank.
    pub fn user_name<'a>(&'a self, name: &'a str) -> &'a str {
        let name = name.trim();
        if name.is_empty() {
            &self.cfg.default_user_name
        } else {
            name
        }
    }

    pub fn is_greeting(&self, input: &str) -> bool {
        let input = input.trim().to_lowercase();
        self.greetings.iter().any(|g| *g == input)
    }

    /// True when the gate is off or some keyword occurs in `input`.
    pub fn in_domain(&self, input: &str) -> bool {
        if self.keywords.is_empty() {
            return true;
        }
        let input = input.to_lowercase();
        self.keywords.iter().any(|k| input.contains(k.as_str()))
    }

    /// Resolve `input`, applying the embedding-error policy.
    pub fn resolve(&self, input: &str) -> Result<MatchResult> {
        match self.matcher.resolve(input) {
            Ok(resolved) => Ok(resolved),
            Err(e) if self.on_embedding_error == EmbeddingErrorPolicy::Fallback => {
                warn!("Topic matching failed, answering from the question: {e}");
                Ok(MatchResult::NoMatch {
                    raw_query: input.to_string(),
                })
            }
            Err(e) => Err(e).context("topic matching failed"),
        }
    }

    /// Produce the desk's reply to one message.
    pub fn reply(&self, user_name: &str, input: &str) -> Result<String> {
        let user = self.user_name(user_name);
        let input = input.trim();

        if self.is_greeting(input) {
            return Ok(format!("Hello {user}! How can I assist you today?"));
        }
        if !self.in_domain(input) {
            return Ok(self.cfg.refusal_message.clone());
        }

        let resolved = self.resolve(input)?;
        debug!(label = ?resolved.label(), "resolved question");

        let prompt = desk_prompt(user, &resolved);
        let completion = self
            .context
            .generate(&prompt, &self.cfg.generation)
            .context("answer generation failed")?;

        Ok(if self.cfg.echo_prompt {
            format!("{prompt}{completion}").trim().to_string()
        } else {
            completion.trim().to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::mock::StaticEmbedder;
    use crate::generation::mock::MockGenerator;

    struct Fixture {
        desk: Desk,
        generator: Arc<MockGenerator>,
        embedder: Arc<StaticEmbedder>,
    }

    fn fixture(embedder: StaticEmbedder, policy: EmbeddingErrorPolicy, echo: bool) -> Fixture {
        let topics = TopicSet::from_pairs([
            ("Loan", "Personal loans from 4.5% APR."),
            ("Savings", "Savings accounts pay 2% interest."),
        ])
        .unwrap();
        let embedder = Arc::new(embedder);
        let matcher = SectionMatcher::new(topics, embedder.clone())
            .with_lead_in_phrases(&["I want to know more about"]);
        let generator = Arc::new(MockGenerator::new("mock").with_reply(" Happy to help."));
        let context = Arc::new(InferenceContext::fixed(generator.clone()));
        let cfg = DeskConfig {
            echo_prompt: echo,
            ..DeskConfig::default()
        };
        Fixture {
            desk: Desk::new("Alice (AI)", matcher, context, cfg, policy),
            generator,
            embedder,
        }
    }

    fn plain() -> Fixture {
        fixture(StaticEmbedder::new(), EmbeddingErrorPolicy::Fallback, true)
    }

    #[test]
    fn test_greeting_skips_backends() {
        let f = plain();
        assert_eq!(
            f.desk.reply("Sam", " Hello ").unwrap(),
            "Hello Sam! How can I assist you today?"
        );
        assert!(f.generator.prompts().is_empty());
        assert_eq!(f.embedder.calls(), 0);
    }

    #[test]
    fn test_blank_name_uses_default() {
        let f = plain();
        assert_eq!(
            f.desk.reply("  ", "hi").unwrap(),
            "Hello User! How can I assist you today?"
        );
    }

    #[test]
    fn test_off_domain_refused() {
        let f = plain();
        assert_eq!(
            f.desk.reply("Sam", "what's the weather today").unwrap(),
            "I'm sorry, I can only answer bank-related questions."
        );
        assert!(f.generator.prompts().is_empty());
    }

    #[test]
    fn test_exact_topic_reply_echoes_prompt() {
        let f = plain();
        let reply = f.desk.reply("Sam", "I want to know more about loan").unwrap();
        assert_eq!(
            reply,
            "Thank you, Sam, for your question.\nSection: Loan\n\nPersonal loans from 4.5% APR.\n\n\
             Please let me know if you have any further questions. Happy to help."
        );
        assert_eq!(f.generator.prompts().len(), 1);
        assert_eq!(f.embedder.calls(), 0);
    }

    #[test]
    fn test_completion_only_without_echo() {
        let f = fixture(StaticEmbedder::new(), EmbeddingErrorPolicy::Fallback, false);
        assert_eq!(f.desk.reply("Sam", "loan").unwrap(), "Happy to help.");
    }

    #[test]
    fn test_embedding_failure_falls_back_to_question() {
        let f = plain();
        f.desk.reply("Sam", "How do I open a savings account?").unwrap();
        let prompts = f.generator.prompts();
        assert_eq!(
            prompts[0],
            "Thank you, Sam, for your question: How do I open a savings account?\n\
             Please let me know if you have any further questions."
        );
    }

    #[test]
    fn test_embedding_failure_aborts_when_configured() {
        let f = fixture(StaticEmbedder::new(), EmbeddingErrorPolicy::Abort, true);
        assert!(f.desk.reply("Sam", "How do I open a savings account?").is_err());
        assert!(f.generator.prompts().is_empty());
    }

    #[test]
    fn test_semantic_section_in_prompt() {
        let question = "what rate do you pay on deposits";
        let embedder = StaticEmbedder::new()
            .with("Loan. Personal loans from 4.5% APR.", vec![0.0, 1.0])
            .with("Savings. Savings accounts pay 2% interest.", vec![1.0, 0.0])
            .with(question, vec![0.9, 0.1]);
        let f = fixture(embedder, EmbeddingErrorPolicy::Abort, false);

        f.desk.reply("Sam", question).unwrap();
        assert!(f.generator.prompts()[0].contains("Section: Savings"));
    }

    #[test]
    fn test_keyword_gate_can_be_disabled() {
        let mut f = plain();
        f.desk.keywords.clear();
        assert!(f.desk.in_domain("anything at all"));
        assert!(f.desk.keywords().is_empty());
    }

    #[test]
    fn test_debug_summary() {
        let f = plain();
        let shown = format!("{:?}", f.desk);
        assert!(shown.contains("Alice (AI)"));
        assert!(shown.contains("\"Loan\""));
        assert!(shown.contains("\"mock\""));
    }

    #[test]
    fn test_keywords_sorted() {
        let f = plain();
        let keywords = f.desk.keywords();
        assert_eq!(keywords.first().map(String::as_str), Some("account opening"));
        assert!(keywords.windows(2).all(|w| w[0] <= w[1]));
    }
}
