//! Response planning
//!
//! Asks the fast provider for a short bullet outline, classifies the
//! question's complexity from it and estimates how many tokens a full answer
//! needs. Planning never aborts a response: any failure yields
//! [`ResponsePlan::fallback`].

use std::sync::Arc;

use advisor_config::constants::planner as defaults;
use advisor_config::PlannerConfig;
use advisor_core::{
    Complexity, Error, GenerationConfig, LanguageModel, Message, ResponsePlan, Result,
};

const SIMPLE_KEYWORDS: &[&str] = &["status", "confirm", "check", "list", "basic"];
const COMPLEX_KEYWORDS: &[&str] = &["explain", "compare", "analyze", "strategy", "implementation"];

/// Lowest temperature any plan adjustment may produce
const MIN_TEMPERATURE: f32 = 0.3;
/// Output share, in percent, kept for the first part of a split answer
const SPLIT_TOKEN_PERCENT: u32 = 65;

/// Per-tier token constants: (per point, base overhead)
fn token_constants(complexity: Complexity) -> (u32, u32) {
    match complexity {
        Complexity::Simple => (50, 30),
        Complexity::Moderate => (75, 50),
        Complexity::Complex => (100, 75),
    }
}

fn outline_prompt(question: &str) -> String {
    format!(
        "Create a brief outline for answering this business question. Focus on key points only.\n\n\
         Question: {}\n\n\
         Requirements:\n\
         - List 2-4 main points to cover\n\
         - Prioritize most important information first\n\
         - Each point should be one line\n\
         - Start each point with \"-\"\n\
         - Be specific and actionable\n\
         - Consider the estimated length needed\n\n\
         Outline:",
        question
    )
}

/// Keep `-` bulleted lines, without the marker
pub fn parse_outline(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| line.starts_with('-'))
        .map(|line| line.trim_start_matches('-').trim_start().to_string())
        .filter(|point| !point.is_empty())
        .collect()
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Sum of per-point weights: long points push the answer towards complex
fn outline_weight(outline: &[String]) -> usize {
    outline
        .iter()
        .map(|point| match word_count(point) {
            n if n > 8 => 2,
            n if n > 5 => 1,
            _ => 0,
        })
        .sum()
}

pub fn classify_complexity(question: &str, outline: &[String]) -> Complexity {
    let lower = question.to_lowercase();
    let has_simple = SIMPLE_KEYWORDS.iter().any(|k| lower.contains(k));
    let has_complex = COMPLEX_KEYWORDS.iter().any(|k| lower.contains(k));
    let weight = outline_weight(outline);

    if outline.len() <= 2 && has_simple && weight < 2 {
        Complexity::Simple
    } else if outline.len() >= 4 || has_complex || weight > 4 {
        Complexity::Complex
    } else {
        Complexity::Moderate
    }
}

pub fn estimate_tokens(outline: &[String], complexity: Complexity) -> u32 {
    let (per_point, overhead) = token_constants(complexity);
    outline.iter().fold(overhead, |total, point| {
        total + word_count(point) as u32 * 2 + per_point
    })
}

pub fn should_split(estimated_tokens: u32, max_tokens: u32, split_ratio: f32) -> bool {
    estimated_tokens as f32 > max_tokens as f32 * split_ratio
}

/// Tighten a generation config for the plan.
///
/// Split answers get a smaller first part and a cooler temperature; simple
/// answers only get the cooler temperature.
pub fn adjust_config(config: GenerationConfig, plan: &ResponsePlan) -> GenerationConfig {
    let mut adjusted = config;
    if plan.should_split {
        adjusted.max_output_tokens = config.max_output_tokens * SPLIT_TOKEN_PERCENT / 100;
        adjusted.temperature = (config.temperature - 0.1).max(MIN_TEMPERATURE);
    } else if plan.complexity == Complexity::Simple {
        adjusted.temperature = (config.temperature - 0.1).max(MIN_TEMPERATURE);
    }
    adjusted
}

/// User message carrying the outline to cover
pub fn structured_prompt(question: &str, plan: &ResponsePlan) -> String {
    let points = plan
        .outline
        .iter()
        .map(|p| format!("- {}", p))
        .collect::<Vec<_>>()
        .join("\n");
    let closing = if plan.should_split {
        "NOTE: This is Part 1 of 2. Focus on the most critical information first."
    } else {
        "Provide a complete response within the token limit."
    };
    format!(
        "Question: {}\n\nKey points to cover:\n{}\n\n{}",
        question, points, closing
    )
}

/// System prompt tuned to the plan
pub fn plan_system_prompt(plan: &ResponsePlan) -> String {
    let focus = if plan.should_split {
        "essential information first"
    } else {
        "complete answers"
    };
    let mut prompt = format!(
        "You are a business AI assistant providing {} guidance. Focus on {}. \
         Use clear structure with headers and bullet points.",
        plan.complexity.as_str(),
        focus
    );
    if plan.should_split {
        prompt.push_str(" Indicate if critical information continues in part 2.");
    }
    prompt
}

/// True when an answer looks cut off: it is empty, stops mid-sentence, ends
/// on a list item or a very short word, or comes close to the token limit.
pub fn is_truncated(response: &str, max_tokens: u32) -> bool {
    let trimmed = response.trim();
    let Some(last_char) = trimmed.chars().last() else {
        return true;
    };
    let last_word = trimmed.split_whitespace().last().unwrap_or("");
    let last_line = trimmed.lines().last().unwrap_or("").trim_start();

    !matches!(last_char, '.' | '!' | '?')
        || last_word.chars().count() <= 2
        || last_line.starts_with(['-', '*', '\u{2022}'])
        || trimmed.chars().count() as f32 >= max_tokens as f32 * defaults::CHARS_PER_TOKEN
}

/// What to do with an answer that came back truncated
#[derive(Debug, Clone, PartialEq)]
pub enum TruncationRepair {
    /// Part one of a split answer: keep it and mark the continuation
    Continue,
    /// Ask again for a compressed answer
    Compress {
        messages: Vec<Message>,
        config: GenerationConfig,
    },
}

/// Repair for a truncated answer, or `None` when it looks complete
pub fn truncation_repair(
    question: &str,
    plan: &ResponsePlan,
    response: &str,
    config: &GenerationConfig,
) -> Option<TruncationRepair> {
    if !is_truncated(response, config.max_output_tokens) {
        return None;
    }
    if plan.should_split && !response.trim().is_empty() {
        return Some(TruncationRepair::Continue);
    }

    let points = plan
        .outline
        .iter()
        .take(defaults::COMPRESSED_POINTS)
        .map(|p| format!("- {}", p))
        .collect::<Vec<_>>()
        .join("\n");
    let prompt = format!(
        "Provide a concise version of this response, focusing only on the most critical \
         information:\n\n\
         Question: {}\n\n\
         Key points (prioritized):\n{}\n\n\
         Response:",
        question, points
    );
    let compressed = config
        .with_max_output_tokens(config.max_output_tokens * defaults::COMPRESSED_TOKEN_PERCENT / 100)
        .with_temperature((config.temperature - 0.1).max(MIN_TEMPERATURE));

    Some(TruncationRepair::Compress {
        messages: vec![Message::user(prompt)],
        config: compressed,
    })
}

/// Part one of a split answer with the continuation marker appended
pub fn mark_continued(text: &str) -> String {
    format!("{}\n\n{}", text.trim_end(), defaults::CONTINUATION_MARKER)
}

pub struct ResponsePlanner {
    model: Option<Arc<dyn LanguageModel>>,
    config: PlannerConfig,
}

impl ResponsePlanner {
    pub fn new(model: Arc<dyn LanguageModel>, config: PlannerConfig) -> Self {
        Self {
            model: Some(model),
            config,
        }
    }

    /// Planner with no outline provider; every plan is the fallback plan
    pub fn disabled(config: PlannerConfig) -> Self {
        Self {
            model: None,
            config,
        }
    }

    pub async fn plan(&self, question: &str, max_tokens: u32) -> ResponsePlan {
        match self.try_plan(question, max_tokens).await {
            Ok(plan) => {
                tracing::debug!(
                    points = plan.outline.len(),
                    complexity = plan.complexity.as_str(),
                    estimated_tokens = plan.estimated_tokens,
                    should_split = plan.should_split,
                    "Response planned"
                );
                plan
            }
            Err(e) => {
                tracing::warn!(error = %e, "Planning failed, using default plan");
                metrics::counter!("advisor_fallbacks_total", "stage" => "planning").increment(1);
                ResponsePlan::fallback()
            }
        }
    }

    pub async fn try_plan(&self, question: &str, max_tokens: u32) -> Result<ResponsePlan> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| Error::PlanningFailed("no outline provider".to_string()))?;

        let config = GenerationConfig::default()
            .with_max_output_tokens(self.config.outline_max_tokens)
            .with_temperature(self.config.outline_temperature)
            .with_top_p(defaults::OUTLINE_TOP_P);
        let raw = model
            .generate(&[Message::user(outline_prompt(question))], &config)
            .await
            .map_err(|e| Error::PlanningFailed(e.to_string()))?;

        let outline = parse_outline(&raw);
        if outline.is_empty() {
            return Err(Error::PlanningFailed(
                "outline contained no bullet points".to_string(),
            ));
        }

        let complexity = classify_complexity(question, &outline);
        let estimated_tokens = estimate_tokens(&outline, complexity);

        Ok(ResponsePlan {
            should_split: should_split(estimated_tokens, max_tokens, self.config.split_ratio),
            outline,
            estimated_tokens,
            complexity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct ScriptedLlm {
        reply: std::result::Result<String, Error>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(Error::unavailable("mock", "down")),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedLlm {
        async fn generate(&self, messages: &[Message], _config: &GenerationConfig) -> Result<String> {
            self.prompts
                .lock()
                .extend(messages.iter().map(|m| m.content.clone()));
            self.reply.clone()
        }

        fn model_name(&self) -> &str {
            "scripted"
        }

        fn provider_name(&self) -> &str {
            "mock"
        }
    }

    fn planner(llm: Arc<ScriptedLlm>) -> ResponsePlanner {
        ResponsePlanner::new(llm, PlannerConfig::default())
    }

    #[tokio::test]
    async fn test_detailed_restructuring_question_splits() {
        let llm = ScriptedLlm::replying(
            "- Assess the current reporting lines and identify overlapping management roles\n\
             - Define the target structure with clear departments and accountable leaders\n\
             - Communicate the change plan to every team with timelines and expectations\n\
             - Track adoption with weekly check-ins and adjust responsibilities as needed",
        );
        let plan = planner(llm)
            .plan("Explain in detail how to restructure a 50-person company", 300)
            .await;

        assert_eq!(plan.outline.len(), 4);
        assert_eq!(plan.complexity, Complexity::Complex);
        assert!(plan.estimated_tokens > 255);
        assert!(plan.should_split);
    }

    #[tokio::test]
    async fn test_short_scheduling_question_does_not_split() {
        let llm = ScriptedLlm::replying("- Check team calendars\n- Confirm the room");
        let plan = planner(llm)
            .plan("Is Tuesday good for a meeting?", 300)
            .await;

        assert_eq!(plan.outline, vec!["Check team calendars", "Confirm the room"]);
        assert_eq!(plan.complexity, Complexity::Moderate);
        assert!(!plan.should_split);
    }

    #[tokio::test]
    async fn test_outline_prompt_carries_question() {
        let llm = ScriptedLlm::replying("- One point");
        planner(llm.clone()).plan("What is churn?", 500).await;
        let prompts = llm.prompts.lock();
        assert!(prompts[0].contains("Question: What is churn?"));
        assert!(prompts[0].ends_with("Outline:"));
    }

    #[tokio::test]
    async fn test_provider_failure_returns_default_plan() {
        let plan = planner(ScriptedLlm::failing()).plan("anything", 300).await;
        assert_eq!(plan, ResponsePlan::fallback());
    }

    #[tokio::test]
    async fn test_outline_without_bullets_returns_default_plan() {
        let llm = ScriptedLlm::replying("Sure, here is how I would answer it.");
        let plan = planner(llm).plan("anything", 300).await;
        assert_eq!(plan, ResponsePlan::fallback());
    }

    #[tokio::test]
    async fn test_disabled_planner_returns_default_plan() {
        let plan = ResponsePlanner::disabled(PlannerConfig::default())
            .plan("anything", 300)
            .await;
        assert_eq!(plan, ResponsePlan::fallback());
    }

    #[test]
    fn test_parse_outline_strips_markers() {
        let outline = parse_outline("Outline:\n  - First\n-Second\n* ignored\n-   \n- Third ");
        assert_eq!(outline, vec!["First", "Second", "Third"]);
    }

    #[test]
    fn test_simple_classification_needs_keyword_and_short_outline() {
        let outline = vec!["Open the dashboard".to_string()];
        assert_eq!(
            classify_complexity("Check my invoice status", &outline),
            Complexity::Simple
        );
        assert_eq!(
            classify_complexity("Where is my invoice", &outline),
            Complexity::Moderate
        );
    }

    #[test]
    fn test_heavy_outline_is_complex() {
        let long = "one two three four five six seven eight nine".to_string();
        let outline = vec![long.clone(), long.clone(), long];
        assert_eq!(classify_complexity("Where next", &outline), Complexity::Complex);
    }

    #[test]
    fn test_estimate_uses_tier_constants() {
        let outline = vec!["a b c".to_string(), "d e".to_string()];
        // 30 + (3*2 + 50) + (2*2 + 50)
        assert_eq!(estimate_tokens(&outline, Complexity::Simple), 140);
        // 75 + (6 + 100) + (4 + 100)
        assert_eq!(estimate_tokens(&outline, Complexity::Complex), 285);
    }

    #[test]
    fn test_adjust_config_for_split_plan() {
        let plan = ResponsePlan {
            outline: vec!["x".into()],
            estimated_tokens: 900,
            complexity: Complexity::Complex,
            should_split: true,
        };
        let base = GenerationConfig::default()
            .with_max_output_tokens(400)
            .with_temperature(0.35);
        let adjusted = adjust_config(base, &plan);
        assert_eq!(adjusted.max_output_tokens, 260);
        assert!((adjusted.temperature - MIN_TEMPERATURE).abs() < f32::EPSILON);
    }

    #[test]
    fn test_adjust_config_cools_simple_plans_only() {
        let mut plan = ResponsePlan::fallback();
        let base = GenerationConfig::default().with_temperature(0.6);
        assert_eq!(adjust_config(base, &plan), base);

        plan.complexity = Complexity::Simple;
        let adjusted = adjust_config(base, &plan);
        assert!((adjusted.temperature - 0.5).abs() < 1e-6);
        assert_eq!(adjusted.max_output_tokens, base.max_output_tokens);
    }

    #[test]
    fn test_split_prompts_mention_part_one() {
        let mut plan = ResponsePlan::fallback();
        assert!(structured_prompt("Q?", &plan).ends_with("within the token limit."));
        assert!(plan_system_prompt(&plan).contains("moderate guidance"));

        plan.should_split = true;
        assert!(structured_prompt("Q?", &plan).contains("Part 1 of 2"));
        assert!(plan_system_prompt(&plan).contains("part 2"));
        assert!(structured_prompt("Q?", &plan).contains("- Key points and information"));
    }

    fn plan_with(points: &[&str], should_split: bool) -> ResponsePlan {
        ResponsePlan {
            outline: points.iter().map(|p| p.to_string()).collect(),
            estimated_tokens: 200,
            complexity: Complexity::Moderate,
            should_split,
        }
    }

    #[test]
    fn test_truncation_signals() {
        assert!(!is_truncated("Raise prices on the top sellers first.", 400));
        assert!(is_truncated("Raise prices on the top sellers and", 400));
        assert!(is_truncated("Start with these steps:\n- Review costs.", 400));
        assert!(!is_truncated("Do it.", 400));
        assert!(is_truncated("Do I.", 400));
        assert!(is_truncated("", 400));
        assert!(is_truncated(&"Long answer sentence. ".repeat(20), 100));
    }

    #[test]
    fn test_truncated_answer_gets_compressed_retry() {
        let plan = plan_with(&["Check margins", "Pick two products", "Announce early"], false);
        let config = GenerationConfig::default()
            .with_max_output_tokens(400)
            .with_temperature(0.7);

        let repair = truncation_repair("How should I raise prices?", &plan, "First, check the", &config);
        let Some(TruncationRepair::Compress { messages, config }) = repair else {
            panic!("expected a compressed retry, got {:?}", repair);
        };
        assert_eq!(config.max_output_tokens, 300);
        assert!((config.temperature - 0.6).abs() < 1e-6);

        let prompt = &messages[0].content;
        assert!(prompt.starts_with("Provide a concise version"));
        assert!(prompt.contains("- Check margins\n- Pick two products"));
        assert!(!prompt.contains("Announce early"));
    }

    #[test]
    fn test_truncated_split_answer_is_continued() {
        let plan = plan_with(&["Check margins"], true);
        let config = GenerationConfig::default().with_max_output_tokens(400);
        assert_eq!(
            truncation_repair("How?", &plan, "First, check the", &config),
            Some(TruncationRepair::Continue)
        );
        assert_eq!(
            truncation_repair("How?", &plan, "Check your margins first.", &config),
            None
        );
        assert_eq!(
            mark_continued("Check the margins. "),
            "Check the margins.\n\n[Continued in Part 2...]"
        );
    }
}
