//! Lazily compiled text patterns shared by the text and speech shaping code.

use once_cell::sync::Lazy;
use regex::Regex;

pub type Pattern = Lazy<Option<Regex>>;

/// Compile a static pattern. A bad pattern is logged and then never matches.
pub fn compile(source: &str) -> Option<Regex> {
    match Regex::new(source) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::error!(pattern = source, error = %e, "Invalid text pattern");
            None
        }
    }
}

pub fn is_match(pattern: &Pattern, text: &str) -> bool {
    pattern.as_ref().map_or(false, |re| re.is_match(text))
}

pub fn match_count(pattern: &Pattern, text: &str) -> usize {
    pattern.as_ref().map_or(0, |re| re.find_iter(text).count())
}

/// Replace every match; an uncompiled pattern leaves the text as is
pub fn replace_all(pattern: &Pattern, text: &str, with: &str) -> String {
    match pattern.as_ref() {
        Some(re) => re.replace_all(text, with).into_owned(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static DIGITS: Pattern = Lazy::new(|| compile(r"\d+"));
    static BROKEN: Pattern = Lazy::new(|| compile(r"(unclosed"));

    #[test]
    fn test_compiled_pattern_matches() {
        assert!(is_match(&DIGITS, "room 42"));
        assert_eq!(match_count(&DIGITS, "1 and 22 and 333"), 3);
        assert_eq!(replace_all(&DIGITS, "room 42", "#"), "room #");
    }

    #[test]
    fn test_invalid_pattern_never_matches() {
        assert!(BROKEN.is_none());
        assert!(!is_match(&BROKEN, "(unclosed"));
        assert_eq!(match_count(&BROKEN, "(unclosed"), 0);
        assert_eq!(replace_all(&BROKEN, "(unclosed", ""), "(unclosed");
    }
}
