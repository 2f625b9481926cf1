//! Text preparation for speech
//!
//! Synthesis engines read markdown literally, so answers are flattened to
//! plain prose first. The same cleaned text is handed to the client when it
//! has to speak the answer itself.

use once_cell::sync::Lazy;

use advisor_config::constants::voice;
use advisor_core::patterns::{compile, is_match, replace_all, Pattern};

static CODE_BLOCK: Pattern = Lazy::new(|| compile(r"(?s)```.*?```"));
static INLINE_CODE: Pattern = Lazy::new(|| compile(r"`([^`]+)`"));
static LINK: Pattern = Lazy::new(|| compile(r"\[([^\]]+)\]\([^)]*\)"));
static BOLD: Pattern = Lazy::new(|| compile(r"(\*\*|__)([^*_]+?)(\*\*|__)"));
static ITALIC: Pattern = Lazy::new(|| compile(r"(\*|_)([^*_\s][^*_]*?)(\*|_)"));
static HEADING: Pattern = Lazy::new(|| compile(r"(?m)^\s*#{1,6}\s+"));
static BULLET: Pattern = Lazy::new(|| compile(r"(?m)^\s*[-*+]\s+"));
static NUMBERED: Pattern = Lazy::new(|| compile(r"(?m)^\s*\d+[.)]\s+"));
static WHITESPACE: Pattern = Lazy::new(|| compile(r"\s+"));

/// Line text that ends a clause when the markdown structure is removed
fn close_line(line: &str) -> String {
    let trimmed = line.trim_end();
    match trimmed.chars().last() {
        Some(c) if c.is_alphanumeric() || c == ')' => format!("{}.", trimmed),
        _ => trimmed.to_string(),
    }
}

/// Flatten markdown into speakable text of at most `char_limit` characters
pub fn strip_markdown_for_speech(text: &str, char_limit: usize) -> String {
    let mut cleaned = replace_all(&CODE_BLOCK, text, " ");
    cleaned = replace_all(&INLINE_CODE, &cleaned, "$1");
    cleaned = replace_all(&LINK, &cleaned, "$1");
    cleaned = replace_all(&BOLD, &cleaned, "$2");
    cleaned = replace_all(&ITALIC, &cleaned, "$2");

    // Headings and list items become their own sentences
    let structural = |line: &str| {
        is_match(&HEADING, line) || is_match(&BULLET, line) || is_match(&NUMBERED, line)
    };
    let lines: Vec<String> = cleaned
        .lines()
        .map(|line| {
            if structural(line) {
                close_line(line)
            } else {
                line.to_string()
            }
        })
        .collect();
    cleaned = lines.join("\n");

    cleaned = replace_all(&HEADING, &cleaned, "");
    cleaned = replace_all(&BULLET, &cleaned, "");
    cleaned = replace_all(&NUMBERED, &cleaned, "");
    cleaned = replace_all(&WHITESPACE, &cleaned, " ");

    truncate_for_speech(cleaned.trim(), char_limit)
}

/// Cut at the last sentence end inside the limit, else at a word with an ellipsis
fn truncate_for_speech(text: &str, char_limit: usize) -> String {
    if text.chars().count() <= char_limit {
        return text.to_string();
    }

    let head: String = text.chars().take(char_limit).collect();
    let sentence_end = head
        .char_indices()
        .filter(|&(i, c)| {
            matches!(c, '.' | '!' | '?')
                && head[i + c.len_utf8()..]
                    .chars()
                    .next()
                    .map_or(true, char::is_whitespace)
        })
        .map(|(i, c)| i + c.len_utf8())
        .last();

    tracing::debug!(
        chars = text.chars().count(),
        limit = char_limit,
        "Speech text truncated"
    );

    match sentence_end {
        Some(end) if end >= head.len() / 2 => head[..end].to_string(),
        _ => {
            let short: String = text.chars().take(char_limit.saturating_sub(3)).collect();
            let cut = short.rfind(char::is_whitespace).unwrap_or(short.len());
            format!("{}...", short[..cut].trim_end())
        }
    }
}

/// (accent, gender) -> voice id
const VOICES: &[(&str, &str, &str)] = &[
    ("US", "female", "aura-asteria-en"),
    ("US", "male", "aura-orion-en"),
    ("UK", "female", "aura-athena-en"),
    ("UK", "male", "aura-helios-en"),
    ("AU", "female", "aura-luna-en"),
    ("AU", "male", "aura-arcas-en"),
];

/// Voice for an accent and gender. Unknown accents fall back to the US voice
/// of the same gender, unknown genders to the default voice.
pub fn voice_for(accent: &str, gender: &str) -> &'static str {
    let accent = accent.trim().to_uppercase();
    let gender = gender.trim().to_lowercase();

    VOICES
        .iter()
        .find(|(a, g, _)| *a == accent && *g == gender)
        .or_else(|| VOICES.iter().find(|(a, g, _)| *a == "US" && *g == gender))
        .map(|(_, _, voice)| *voice)
        .unwrap_or(voice::DEFAULT_VOICE)
}
