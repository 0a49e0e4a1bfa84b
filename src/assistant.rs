/// Free-form assistant chat with a bounded history window.
use crate::config::AssistantConfig;
use crate::context::InferenceContext;
use crate::generation::{GenerationError, GenerationParams};
use crate::prompt::{ChatTurn, Role, chat_prompt};

pub struct ChatSession {
    system: ChatTurn,
    history: Vec<ChatTurn>,
    window: usize,
    params: GenerationParams,
}

impl ChatSession {
    pub fn new(cfg: &AssistantConfig) -> Self {
        Self {
            system: ChatTurn::new(Role::System, cfg.system_prompt.clone()),
            history: Vec::new(),
            window: cfg.history_window.max(1),
            params: cfg.generation.clone(),
        }
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    /// System prompt followed by the last `window` turns.
    fn transcript(&self) -> Vec<ChatTurn> {
        let start = self.history.len().saturating_sub(self.window);
        std::iter::once(self.system.clone())
            .chain(self.history[start..].iter().cloned())
            .collect()
    }

    /// Send one user message and record the exchange.
    ///
    /// Only the newest `window` turns are kept. A failed generation leaves
    /// the history untouched.
    pub fn ask(&mut self, ctx: &InferenceContext, input: &str) -> Result<String, GenerationError> {
        self.history.push(ChatTurn::new(Role::User, input.trim()));
        let prompt = chat_prompt(&self.transcript());

        match ctx.generate(&prompt, &self.params) {
            Ok(reply) => {
                let reply = reply.trim().to_string();
                self.history.push(ChatTurn::new(Role::Assistant, reply.clone()));
                let stale = self.history.len().saturating_sub(self.window);
                self.history.drain(..stale);
                Ok(reply)
            }
            Err(e) => {
                self.history.pop();
                Err(e)
            }
        }
    }
}
