//! Response post-processing
//!
//! Turns raw model output into the final answer: bare tool names become
//! canonical markdown links, over-long answers are trimmed on structural
//! boundaries, and a trimmed answer always ends on terminal punctuation with
//! no half-written link.

use std::collections::HashMap;
use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

use advisor_config::constants::{messages, post_process as limits};
use advisor_config::{PostProcessConfig, ToolLink};

use advisor_core::patterns::{compile, Pattern};
use crate::AgentError;

static MARKDOWN_LINK: Pattern = Lazy::new(|| compile(r"\[[^\[\]\n]*\]\([^()\s]*\)"));
static HEADING: Pattern = Lazy::new(|| compile(r"^#{1,6}\s"));

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn char_count(text: &str) -> usize {
    text.chars().count()
}

fn is_heading(line: &str) -> bool {
    HEADING
        .as_ref()
        .map_or(false, |re| re.is_match(line.trim_start()))
}

/// True when some line is neither blank nor a heading
fn has_body(text: &str) -> bool {
    text.lines()
        .any(|line| !line.trim().is_empty() && !is_heading(line))
}

fn link_spans(text: &str) -> Vec<Range<usize>> {
    MARKDOWN_LINK
        .as_ref()
        .map(|re| re.find_iter(text).map(|m| m.range()).collect())
        .unwrap_or_default()
}

/// Byte offsets where a complete unit (sentence, line or list item) ends.
/// Never inside a markdown link.
fn unit_ends(text: &str) -> Vec<usize> {
    let spans = link_spans(text);
    let inside_link = |pos: usize| spans.iter().any(|s| s.start < pos && pos < s.end);

    let mut ends = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let end = i + c.len_utf8();
        let boundary = match c {
            '\n' => true,
            '.' | '!' | '?' => chars.peek().map_or(true, |(_, next)| next.is_whitespace()),
            _ => false,
        };
        if boundary && !inside_link(end) {
            ends.push(end);
        }
    }
    if ends.last() != Some(&text.len()) && !inside_link(text.len()) {
        ends.push(text.len());
    }
    ends
}

/// Longest prefix made of whole units that fits both budgets
fn take_units(text: &str, max_words: usize, max_chars: usize) -> &str {
    let mut best = 0;
    for end in unit_ends(text) {
        let prefix = &text[..end];
        if word_count(prefix) > max_words || char_count(prefix.trim_end()) > max_chars {
            break;
        }
        best = end;
    }
    &text[..best]
}

/// First `max_chars` characters, cut on a char boundary
fn take_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}

/// Word-level cut for a single unit larger than the whole budget.
/// Backs off to the start of any link the cut would land in; a first word
/// longer than the budget is cut mid-word.
fn take_words(text: &str, max_words: usize, max_chars: usize) -> &str {
    let spans = link_spans(text);
    let mut cut = 0;
    let mut words = 0;
    let mut in_word = false;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if in_word {
                words += 1;
                in_word = false;
                if words > max_words || char_count(&text[..i]) > max_chars {
                    break;
                }
                if !spans.iter().any(|s| s.start < i && i < s.end) {
                    cut = i;
                }
            }
        } else {
            in_word = true;
        }
    }
    if cut == 0 {
        return take_chars(text, max_chars);
    }
    &text[..cut]
}

/// Split finished text into sentence-sized pieces for streaming.
/// Concatenating the pieces gives back the input.
pub fn sentence_chunks(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut start = 0;
    for end in unit_ends(text) {
        if end > start {
            chunks.push(text[start..end].to_string());
            start = end;
        }
    }
    if start < text.len() {
        chunks.push(text[start..].to_string());
    }
    chunks
}

/// Split at heading lines. The first slice is whatever precedes the first heading.
fn split_sections(text: &str) -> Vec<&str> {
    let mut starts = vec![0];
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if offset > 0 && is_heading(line) {
            starts.push(offset);
        }
        offset += line.len();
    }
    starts.push(text.len());
    starts
        .windows(2)
        .map(|w| &text[w[0]..w[1]])
        .filter(|s| !s.is_empty())
        .collect()
}

/// Cut a truncated trailing link (`[label` or `[label](/par`) off the end
pub fn strip_dangling_link(text: &str) -> &str {
    let Some(open) = text.rfind('[') else {
        return text;
    };
    let tail = &text[open..];
    let complete = match tail.find("](") {
        Some(mid) => tail[mid..].contains(')'),
        None => tail.contains(']'),
    };
    if complete {
        text
    } else {
        &text[..open]
    }
}

/// Drop trailing headings and separators, then end on `.`, `!` or `?`
pub fn ensure_terminal(text: &str) -> String {
    let mut lines: Vec<&str> = text.trim_end().lines().collect();
    while let Some(last) = lines.last() {
        if last.trim().is_empty() || is_heading(last) {
            lines.pop();
        } else {
            break;
        }
    }
    let joined = lines.join("\n");
    let mut out = joined
        .trim_end_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | ':' | '-'))
        .to_string();
    if !out.is_empty() && !out.ends_with(|c: char| matches!(c, '.' | '!' | '?')) {
        out.push('.');
    }
    out
}

pub struct PostProcessor {
    link_pattern: Option<Regex>,
    routes: HashMap<String, ToolLink>,
    max_words: usize,
    max_chars: usize,
    trim_ratio: f32,
}

impl PostProcessor {
    pub fn new(config: &PostProcessConfig) -> Result<Self, AgentError> {
        let mut routes: HashMap<String, ToolLink> = config
            .links
            .iter()
            .map(|link| (link.name.to_lowercase(), link.clone()))
            .collect();

        for alias in &config.aliases {
            match routes.get(&alias.canonical.to_lowercase()).cloned() {
                Some(target) => {
                    routes.insert(alias.name.to_lowercase(), target);
                }
                None => tracing::warn!(
                    alias = %alias.name,
                    canonical = %alias.canonical,
                    "Alias points at an unknown tool, ignoring"
                ),
            }
        }

        let mut names: Vec<&String> = routes.keys().collect();
        // Longest first so "Growth Machine Planner" wins over "Growth Machine"
        names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        let link_pattern = if names.is_empty() {
            None
        } else {
            let alternatives = names
                .iter()
                .map(|n| regex::escape(n))
                .collect::<Vec<_>>()
                .join("|");
            Some(
                Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives))
                    .map_err(|e| AgentError::Pattern(e.to_string()))?,
            )
        };

        Ok(Self {
            link_pattern,
            routes,
            max_words: config.max_words,
            max_chars: config.max_chars,
            trim_ratio: config.trim_ratio,
        })
    }

    /// Same tables with a different length budget
    pub fn with_limits(mut self, max_words: usize, max_chars: usize) -> Self {
        self.max_words = max_words;
        self.max_chars = max_chars;
        self
    }

    /// Wrap bare tool names in canonical links. Existing links are left alone.
    pub fn inject_links(&self, text: &str) -> String {
        let Some(pattern) = &self.link_pattern else {
            return text.to_string();
        };
        let spans = link_spans(text);
        let bytes = text.as_bytes();

        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        let mut injected = 0usize;
        for m in pattern.find_iter(text) {
            if spans.iter().any(|s| m.start() < s.end && m.end() > s.start) {
                continue;
            }
            let Some(target) = self.routes.get(&m.as_str().to_lowercase()) else {
                continue;
            };

            // A bracketed name without a URL is replaced brackets and all
            let mut start = m.start();
            let mut end = m.end();
            let bracketed = start > 0
                && bytes[start - 1] == b'['
                && bytes.get(end) == Some(&b']')
                && bytes.get(end + 1) != Some(&b'(');
            if bracketed {
                start -= 1;
                end += 1;
            }
            if start < last {
                continue;
            }

            out.push_str(&text[last..start]);
            out.push_str(&format!("[{}]({})", target.name, target.route));
            last = end;
            injected += 1;
        }
        out.push_str(&text[last..]);

        if injected > 0 {
            tracing::debug!(injected, "Tool links injected");
        }
        out
    }

    pub fn is_over_budget(&self, text: &str) -> bool {
        word_count(text) > self.max_words || char_count(text) > self.max_chars
    }

    /// Trim an over-budget answer to about `trim_ratio` of the budget.
    ///
    /// Whole sections are kept first; the first section that does not fit is
    /// cut at its last complete unit. When that leaves too little, the whole
    /// text is trimmed sentence by sentence instead.
    pub fn enforce_length(&self, text: &str) -> String {
        let text = text.trim();
        if !self.is_over_budget(text) {
            return text.to_string();
        }

        let target_words = (self.max_words as f32 * self.trim_ratio).floor() as usize;
        let target_chars = (self.max_chars as f32 * self.trim_ratio).floor() as usize;

        let sectioned = self.trim_sections(text, target_words, target_chars);
        let trimmed = if char_count(sectioned.trim()) >= limits::MIN_SECTION_RESULT_CHARS {
            sectioned
        } else {
            let by_units = take_units(text, target_words, target_chars);
            if !has_body(by_units) {
                take_words(text, target_words, target_chars).to_string()
            } else {
                by_units.to_string()
            }
        };

        let result = ensure_terminal(strip_dangling_link(&trimmed));
        tracing::debug!(
            words_before = word_count(text),
            words_after = word_count(&result),
            chars_after = char_count(&result),
            "Response trimmed"
        );
        metrics::counter!("advisor_responses_trimmed_total").increment(1);
        result
    }

    fn trim_sections(&self, text: &str, target_words: usize, target_chars: usize) -> String {
        let mut out = String::new();
        let mut words = 0;
        for section in split_sections(text) {
            let section_words = word_count(section);
            if words + section_words <= target_words
                && char_count(&out) + char_count(section) <= target_chars
            {
                out.push_str(section);
                words += section_words;
                continue;
            }

            let remaining_words = target_words.saturating_sub(words);
            let remaining_chars = target_chars.saturating_sub(char_count(&out));
            if remaining_words >= limits::MIN_PARTIAL_WORDS {
                let partial = take_units(section, remaining_words, remaining_chars);
                if has_body(partial) {
                    out.push_str(partial);
                }
            }
            break;
        }
        out
    }

    /// Full post-processing of raw model output. Output that repairs down
    /// to nothing is replaced by the apology.
    pub fn finalize(&self, raw: &str) -> String {
        let raw = raw.trim();
        let repaired = strip_dangling_link(raw);
        let repaired = if repaired.len() < raw.len() {
            ensure_terminal(repaired)
        } else {
            repaired.to_string()
        };
        let linked = self.inject_links(&repaired);
        let text = self.enforce_length(&linked);
        if text.trim().is_empty() {
            tracing::warn!(raw_chars = raw.len(), "Answer empty after post-processing");
            return messages::GENERATION_APOLOGY.to_string();
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor() -> PostProcessor {
        PostProcessor::new(&PostProcessConfig::default()).unwrap()
    }

    /// Every `[` that starts a link (`[label](`) is closed by `)`,
    /// and every `[` is closed by `]`.
    fn assert_links_complete(text: &str) {
        for (i, _) in text.match_indices('[') {
            let rest = &text[i..];
            let close = rest
                .find(']')
                .unwrap_or_else(|| panic!("unclosed '[' at {} in {:?}", i, text));
            if rest[close + 1..].starts_with('(') {
                assert!(
                    rest[close + 1..].contains(')'),
                    "dangling link at {} in {:?}",
                    i,
                    text
                );
            }
        }
    }

    #[test]
    fn test_bare_names_become_links() {
        let out = processor().inject_links("Start with your company scorecard and the Battle Plan.");
        assert_eq!(
            out,
            "Start with your [Company Scorecard](/company-scorecard) and the [Battle Plan](/battle-plan)."
        );
    }

    #[test]
    fn test_longest_name_wins() {
        let out = processor().inject_links("Open the Growth Machine Planner today.");
        assert_eq!(out, "Open the [Growth Machine Planner](/growth-machine-planner) today.");
    }

    #[test]
    fn test_existing_links_untouched() {
        let text = "Use the [Company Scorecard](/company-scorecard) weekly.";
        assert_eq!(processor().inject_links(text), text);
    }

    #[test]
    fn test_alias_and_bracketed_name() {
        let p = processor();
        assert_eq!(
            p.inject_links("Check Command HQ first."),
            "Check [Company Scorecard](/company-scorecard) first."
        );
        assert_eq!(
            p.inject_links("See [Triage Planner] for urgent work."),
            "See [Triage Planner](/triage-planner) for urgent work."
        );
    }

    #[test]
    fn test_short_answer_unchanged() {
        let text = "## Summary\nKeep it simple.\n\n- One point";
        assert_eq!(processor().enforce_length(text), text);
    }

    #[test]
    fn test_trims_whole_sections() {
        let section = |title: &str| {
            format!(
                "## {}\nThis section explains one part of the plan in plain words. \
                 It has a second sentence for weight.\n\n",
                title
            )
        };
        let text: String = ["One", "Two", "Three", "Four", "Five", "Six"]
            .iter()
            .map(|t| section(t))
            .collect();
        let p = processor().with_limits(60, 10_000);
        let out = p.enforce_length(&text);

        assert!(word_count(&out) <= 51);
        assert!(out.starts_with("## One"));
        assert!(out.contains("## Two"));
        assert!(!out.contains("## Six"));
        assert!(out.ends_with('.'));
    }

    #[test]
    fn test_oversized_section_cut_at_sentence() {
        let text = "Hiring well matters. ".repeat(40) + "And the last sentence trails off without";
        let p = processor().with_limits(50, 10_000);
        let out = p.enforce_length(&text);
        assert!(word_count(&out) <= 42);
        assert!(out.ends_with("matters."));
    }

    #[test]
    fn test_heading_with_unbroken_body_falls_back_to_words() {
        let text = format!("## Plan\n{}", "step ".repeat(300));
        let out = processor().with_limits(40, 10_000).enforce_length(&text);
        assert!(out.starts_with("## Plan\nstep"));
        assert!(word_count(&out) <= 34);
        assert!(out.ends_with("step."));
    }

    #[test]
    fn test_single_huge_sentence_is_cut_on_words() {
        let text = "word ".repeat(500);
        let out = processor().with_limits(20, 10_000).enforce_length(&text);
        assert_eq!(word_count(&out), 17);
        assert!(out.ends_with("word."));
    }

    #[test]
    fn test_links_complete_after_trimming() {
        let body = "Review the [Company Scorecard](/company-scorecard) before each meeting. \
                    Then update the Chain of Command so owners are clear. "
            .repeat(30);
        let text = format!("## Plan\n{}See [Battle Plan](/battle-pl", body);
        let p = processor().with_limits(120, 700);
        let out = p.finalize(&text);

        assert_links_complete(&out);
        assert!(out.contains("[Chain of Command](/chain-of-command)"));
        assert!(char_count(&out) <= 700);
        assert!(out.ends_with('.'));
    }

    #[test]
    fn test_truncated_link_is_removed() {
        let out = processor().finalize("Next, open the [Growth Machine](/gro");
        assert_eq!(out, "Next, open the.");
        assert_links_complete(&out);

        let out = processor().finalize("Done. Then see [Triage");
        assert_eq!(out, "Done. Then see.");
    }

    #[test]
    fn test_trailing_heading_dropped() {
        assert_eq!(
            ensure_terminal("Keep weekly numbers.\n\n## Next Steps\n"),
            "Keep weekly numbers."
        );
        assert_eq!(ensure_terminal("Your next steps:"), "Your next steps.");
        assert_eq!(ensure_terminal(""), "");
    }

    #[test]
    fn test_sentence_chunks_rebuild_text() {
        let text = "## Plan\nFirst step. Then the [Battle Plan](/battle-plan). Done!";
        let chunks = sentence_chunks(text);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks.concat(), text);
        assert_eq!(chunks[2], " Then the [Battle Plan](/battle-plan).");
        assert!(sentence_chunks("").is_empty());
    }

    #[test]
    fn test_unit_ends_skip_links() {
        let text = "See [v1. notes](/v1) now. Done";
        let ends = unit_ends(text);
        assert_eq!(ends, vec![25, text.len()]);
    }

    #[test]
    fn test_oversized_single_word_is_cut_not_emptied() {
        let processor = processor().with_limits(350, 40);
        let token = format!("https://example.com/{}", "a".repeat(120));

        let out = processor.finalize(&token);
        assert!(out.starts_with("https://example.com/aaa"));
        assert!(out.chars().count() <= 40);
        assert!(out.ends_with('.'));
    }

    #[test]
    fn test_output_that_repairs_to_nothing_becomes_apology() {
        let processor = processor();
        assert_eq!(processor.finalize("[X](/gr"), messages::GENERATION_APOLOGY);
        assert_eq!(processor.finalize("   "), messages::GENERATION_APOLOGY);
    }
}
