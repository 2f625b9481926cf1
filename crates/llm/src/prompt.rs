//! Prompt assembly
//!
//! Builds the message list sent to a provider: system prompt, retrieved
//! instructions, formatting addendum, recent turns, then the user query.

use unicode_segmentation::UnicodeSegmentation;

use advisor_core::{ChatRole, ChatTurn, Message, RetrievalResult, Role};

/// Base system prompt for advisory answers
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert business advisor with deep knowledge \
across all business domains. Never use emojis. Use markdown headings for main sections, numbered \
lists for sequential steps and bullet points for related items. Keep paragraphs to two or three \
sentences and always finish with concrete next steps.";

#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    messages: Vec<Message>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a system message
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        if !prompt.trim().is_empty() {
            self.messages.push(Message::system(prompt));
        }
        self
    }

    /// Add retrieved instructions as grounding context
    pub fn with_instructions(mut self, retrieval: &RetrievalResult) -> Self {
        if !retrieval.is_empty() {
            self.messages.push(Message::system(format!(
                "## Relevant Instructions\n{}\n\nFollow these instructions when they apply to the question.",
                retrieval.as_context()
            )));
        }
        self
    }

    /// Add a formatting addendum
    pub fn with_addendum(self, addendum: &str) -> Self {
        self.system_prompt(addendum)
    }

    /// Add prior conversation turns, oldest first
    pub fn with_history(mut self, turns: &[ChatTurn]) -> Self {
        self.messages.extend(turns.iter().map(|turn| match turn.role {
            ChatRole::User => Message::user(turn.content.clone()),
            ChatRole::Assistant => Message::assistant(turn.content.clone()),
        }));
        self
    }

    /// Add the current user message
    pub fn user_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(Message::user(message));
        self
    }

    pub fn build(self) -> Vec<Message> {
        self.messages
    }

    /// Build, dropping the oldest non-system messages until the estimate fits.
    /// The final user message is always kept.
    pub fn build_with_limit(self, max_tokens: usize) -> Vec<Message> {
        let current = self.estimate_tokens();
        if current <= max_tokens {
            return self.messages;
        }

        let (system, mut conversation): (Vec<_>, Vec<_>) = self
            .messages
            .into_iter()
            .partition(|m| m.role == Role::System);

        let system_tokens: usize = system.iter().map(|m| estimate_text_tokens(&m.content)).sum();
        let available = max_tokens.saturating_sub(system_tokens);

        let last = conversation.pop();
        let mut used = last.as_ref().map_or(0, |m| estimate_text_tokens(&m.content));
        let mut kept = Vec::new();
        for msg in conversation.into_iter().rev() {
            let tokens = estimate_text_tokens(&msg.content);
            if used + tokens > available {
                break;
            }
            used += tokens;
            kept.push(msg);
        }
        kept.reverse();

        let mut result = system;
        result.extend(kept);
        result.extend(last);

        tracing::debug!(
            before = current,
            after = system_tokens + used,
            messages = result.len(),
            "Prompt truncated"
        );

        result
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn estimate_tokens(&self) -> usize {
        self.messages
            .iter()
            .map(|m| estimate_text_tokens(&m.content))
            .sum()
    }
}

/// Rough token estimate, about four graphemes per token
pub fn estimate_text_tokens(text: &str) -> usize {
    text.graphemes(true).count().max(1) / 4
}
