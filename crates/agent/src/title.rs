//! Conversation titles
//!
//! A short title is asked from the fast provider for the first message of an
//! instance. Anything unusable falls back to a heuristic built from the
//! message itself. Title generation never fails.

use std::sync::Arc;

use once_cell::sync::Lazy;

use advisor_config::constants::history;
use advisor_core::{is_generic_title, GenerationConfig, LanguageModel, Message};

use advisor_core::patterns::{compile, Pattern};

/// Used when neither the model nor the heuristic produce anything
pub const FALLBACK_TITLE: &str = "Business Question";

static TITLE_PREFIX: Pattern = Lazy::new(|| compile(r"(?i)^\s*(chat\s+)?title\s*:\s*"));
static GREETING: Pattern =
    Lazy::new(|| compile(r"(?i)^(hi|hello|hey|please|can you|could you|i want to|i need to)\b[\s,]*"));

const QUOTES: &[char] = &['"', '\'', '`', '\u{201C}', '\u{201D}', '\u{2018}', '\u{2019}', '*'];

fn title_prompt(message: &str, max_words: usize) -> String {
    format!(
        "Write a short title of at most {} words for a conversation that starts with the \
         message below. Reply with the title only, without quotes or punctuation.\n\n\
         Message: {}",
        max_words, message
    )
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Clean a model reply into a title, or `None` when it is unusable
pub fn clean_title(raw: &str, max_words: usize) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = match TITLE_PREFIX.as_ref() {
        Some(re) => re.replace(line, "").into_owned(),
        None => line.to_string(),
    };

    let words: Vec<&str> = line
        .split_whitespace()
        .map(|w| w.trim_matches(QUOTES))
        .filter(|w| !w.is_empty())
        .take(max_words)
        .collect();
    let title = words
        .join(" ")
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .trim()
        .to_string();

    if title.is_empty() || is_generic_title(&title) {
        None
    } else {
        Some(capitalize(&title))
    }
}

/// Title from the first words of the message itself
pub fn heuristic_title(message: &str, max_words: usize) -> Option<String> {
    let first_line = message.lines().map(str::trim).find(|l| !l.is_empty())?;
    let stripped = match GREETING.as_ref() {
        Some(re) => re.replace(first_line, "").into_owned(),
        None => first_line.to_string(),
    };

    let words: Vec<String> = stripped
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric() && c != '-' && c != '&')
                .to_string()
        })
        .filter(|w| !w.is_empty())
        .take(max_words)
        .collect();
    if words.is_empty() {
        return None;
    }

    let title = capitalize(&words.join(" "));
    if is_generic_title(&title) {
        None
    } else {
        Some(title)
    }
}

pub struct TitleGenerator {
    model: Option<Arc<dyn LanguageModel>>,
    max_words: usize,
}

impl TitleGenerator {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model: Some(model),
            max_words: history::TITLE_MAX_WORDS,
        }
    }

    /// Heuristic titles only
    pub fn heuristic() -> Self {
        Self {
            model: None,
            max_words: history::TITLE_MAX_WORDS,
        }
    }

    pub fn with_max_words(mut self, max_words: usize) -> Self {
        self.max_words = max_words.max(1);
        self
    }

    /// Only generic placeholder titles may be replaced
    pub fn should_generate(current_title: &str) -> bool {
        is_generic_title(current_title)
    }

    pub async fn generate(&self, first_message: &str) -> String {
        if let Some(model) = &self.model {
            let config = GenerationConfig::default()
                .with_max_output_tokens(20)
                .with_temperature(0.3);
            let prompt = title_prompt(first_message, self.max_words);
            match model.generate(&[Message::user(prompt)], &config).await {
                Ok(raw) => {
                    if let Some(title) = clean_title(&raw, self.max_words) {
                        return title;
                    }
                    tracing::debug!(raw = %raw, "Model title unusable, using heuristic");
                }
                Err(e) => tracing::debug!(error = %e, "Title generation failed, using heuristic"),
            }
        }

        heuristic_title(first_message, self.max_words)
            .unwrap_or_else(|| FALLBACK_TITLE.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use advisor_core::{Error, Result};
    use async_trait::async_trait;

    struct FixedLlm(std::result::Result<String, Error>);

    #[async_trait]
    impl LanguageModel for FixedLlm {
        async fn generate(&self, _: &[Message], _: &GenerationConfig) -> Result<String> {
            self.0.clone()
        }

        fn model_name(&self) -> &str {
            "fixed"
        }

        fn provider_name(&self) -> &str {
            "mock"
        }
    }

    #[test]
    fn test_clean_title_strips_quotes_and_prefix() {
        assert_eq!(
            clean_title("Title: \"Hiring Your First Sales Lead\"", 6).as_deref(),
            Some("Hiring Your First Sales Lead")
        );
        assert_eq!(
            clean_title("\n\u{201C}quarterly planning basics.\u{201D}\n", 6).as_deref(),
            Some("Quarterly planning basics")
        );
    }

    #[test]
    fn test_clean_title_limits_words() {
        let title = clean_title("One two three four five six seven eight", 6).unwrap();
        assert_eq!(title.split_whitespace().count(), 6);
    }

    #[test]
    fn test_clean_title_rejects_generic() {
        assert_eq!(clean_title("New Chat", 6), None);
        assert_eq!(clean_title("   ", 6), None);
    }

    #[test]
    fn test_heuristic_title() {
        assert_eq!(
            heuristic_title("Hi, how do I price a consulting retainer for small firms?", 6)
                .as_deref(),
            Some("How do I price a consulting")
        );
        assert_eq!(heuristic_title("???", 6), None);
    }

    #[tokio::test]
    async fn test_generate_prefers_model_title() {
        let generator = TitleGenerator::new(Arc::new(FixedLlm(Ok("Cash Flow Forecast".into()))));
        assert_eq!(generator.generate("help with cash").await, "Cash Flow Forecast");
    }

    #[tokio::test]
    async fn test_generate_falls_back_on_failure() {
        let generator =
            TitleGenerator::new(Arc::new(FixedLlm(Err(Error::unavailable("mock", "down")))));
        assert_eq!(
            generator.generate("Plan the next board meeting").await,
            "Plan the next board meeting"
        );
        assert_eq!(TitleGenerator::heuristic().generate("!!!").await, FALLBACK_TITLE);
    }

    #[test]
    fn test_should_generate_only_for_generic() {
        assert!(TitleGenerator::should_generate("New Chat"));
        assert!(TitleGenerator::should_generate("voice chat"));
        assert!(!TitleGenerator::should_generate("Cash Flow Forecast"));
    }
}
