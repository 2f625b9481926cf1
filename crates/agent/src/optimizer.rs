//! Quality optimizer
//!
//! Maps a pipeline profile, a query and a surface to generation parameters
//! and a formatting addendum, and lints finished answers for telemetry.
//!
//! Query classification is a pure function over the query text so it can be
//! checked against a fixture table.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use advisor_config::constants::{pipeline as defaults, voice};
use advisor_config::ToolLink;
use advisor_core::{GenerationConfig, Surface};

use advisor_core::patterns::{compile, is_match, match_count, Pattern};
use crate::AgentError;

/// Response style of a pipeline profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStyle {
    Concise,
    Structured,
    Detailed,
    Conversational,
}

impl ResponseStyle {
    pub fn base_temperature(&self) -> f32 {
        match self {
            ResponseStyle::Concise => 0.3,
            ResponseStyle::Structured => 0.4,
            ResponseStyle::Detailed => 0.5,
            ResponseStyle::Conversational => 0.6,
        }
    }

    fn guidelines(&self) -> &'static [&'static str] {
        match self {
            ResponseStyle::Concise => &[
                "Keep responses brief and to-the-point",
                "Use short sentences and simple structure",
                "Focus on essential information only",
            ],
            ResponseStyle::Structured => &[
                "Use clear headings and bullet points",
                "Organize information logically",
                "Balance detail with readability",
            ],
            ResponseStyle::Detailed => &[
                "Provide thorough analysis when needed",
                "Include supporting data and context",
                "Maintain clear structure despite length",
            ],
            ResponseStyle::Conversational => &[
                "Use natural, friendly language",
                "Keep the tone engaging but professional",
                "Optimize for spoken or casual interaction",
            ],
        }
    }
}

/// Static shaping profile of one pipeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineProfile {
    pub name: &'static str,
    pub purpose: &'static str,
    pub style: ResponseStyle,
    pub max_tokens: u32,
    pub principles: &'static [&'static str],
}

/// Known pipeline identities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineId {
    MainChat,
    InnovationChat,
    VoiceChat,
    ProfileChat,
    EnhancedChat,
    DashboardChat,
    ContentGeneration,
    WebsocketVoice,
}

impl PipelineId {
    pub const ALL: [PipelineId; 8] = [
        PipelineId::MainChat,
        PipelineId::InnovationChat,
        PipelineId::VoiceChat,
        PipelineId::ProfileChat,
        PipelineId::EnhancedChat,
        PipelineId::DashboardChat,
        PipelineId::ContentGeneration,
        PipelineId::WebsocketVoice,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineId::MainChat => "main-chat",
            PipelineId::InnovationChat => "innovation-chat",
            PipelineId::VoiceChat => "voice-chat",
            PipelineId::ProfileChat => "profile-chat",
            PipelineId::EnhancedChat => "enhanced-chat",
            PipelineId::DashboardChat => "dashboard-chat",
            PipelineId::ContentGeneration => "content-generation",
            PipelineId::WebsocketVoice => "websocket-voice",
        }
    }

    pub fn profile(&self) -> PipelineProfile {
        match self {
            PipelineId::MainChat => PipelineProfile {
                name: "Main Chat",
                purpose: "General business advisory and problem-solving",
                style: ResponseStyle::Structured,
                max_tokens: 500,
                principles: &[
                    "Answer the specific question asked directly",
                    "Provide 1 key actionable point maximum for basic questions",
                    "Use clear structure with headings only when needed",
                    "Include relevant links to tools when directly applicable",
                    "End with specific immediate next steps",
                    "Avoid comprehensive overviews unless specifically requested",
                    "Start with YES/NO for yes/no questions",
                    "Never end a response mid-sentence or mid-link",
                    "Complete all started sections and lists",
                ],
            },
            PipelineId::InnovationChat => PipelineProfile {
                name: "Innovation Machine",
                purpose: "Creative business innovation and opportunities",
                style: ResponseStyle::Structured,
                max_tokens: 1000,
                principles: &[
                    "Focus on 1-2 innovative ideas maximum",
                    "Provide implementation feasibility",
                    "Include ROI considerations",
                    "Offer concrete first steps",
                    "Balance creativity with practicality",
                ],
            },
            PipelineId::VoiceChat => PipelineProfile {
                name: "Voice Assistant",
                purpose: "Real-time voice interaction and quick answers",
                style: ResponseStyle::Conversational,
                max_tokens: 450,
                principles: &[
                    "Keep responses under 30 seconds to read",
                    "Use conversational language",
                    "Prioritize immediate actionability",
                    "Avoid complex formatting",
                    "Focus on single clear answer",
                ],
            },
            PipelineId::ProfileChat => PipelineProfile {
                name: "Profile Assistant",
                purpose: "Personalized guidance based on user profile",
                style: ResponseStyle::Conversational,
                max_tokens: 600,
                principles: &[
                    "Reference user context specifically",
                    "Provide personalized recommendations",
                    "Keep advice tailored and relevant",
                    "Suggest profile-specific tools",
                    "Focus on the user's current goals",
                ],
            },
            PipelineId::EnhancedChat => PipelineProfile {
                name: "Enhanced Contextual Chat",
                purpose: "Context-aware conversations with deep understanding",
                style: ResponseStyle::Structured,
                max_tokens: 700,
                principles: &[
                    "Leverage provided context effectively",
                    "Synthesize information concisely",
                    "Provide context-aware recommendations",
                    "Avoid repeating known information",
                    "Focus on value-added insights",
                ],
            },
            PipelineId::DashboardChat => PipelineProfile {
                name: "AI Dashboard",
                purpose: "Business analytics and performance insights",
                style: ResponseStyle::Detailed,
                max_tokens: 900,
                principles: &[
                    "Focus on key metrics and trends",
                    "Provide data-driven insights",
                    "Suggest specific improvements",
                    "Include measurable outcomes",
                    "Prioritize actionable analytics",
                ],
            },
            PipelineId::ContentGeneration => PipelineProfile {
                name: "Content Generator",
                purpose: "Quick content creation and text generation",
                style: ResponseStyle::Concise,
                max_tokens: 300,
                principles: &[
                    "Generate exactly what was requested",
                    "Avoid unnecessary explanations",
                    "Focus on quality over quantity",
                    "Match requested tone and style",
                    "Provide ready-to-use content",
                ],
            },
            PipelineId::WebsocketVoice => PipelineProfile {
                name: "WebSocket Voice",
                purpose: "Real-time voice processing and responses",
                style: ResponseStyle::Conversational,
                max_tokens: 450,
                principles: &[
                    "Optimize for speech synthesis",
                    "Use natural conversation flow",
                    "Keep responses under 25 seconds",
                    "Prioritize clarity over completeness",
                    "Focus on immediate value",
                ],
            },
        }
    }
}

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineId {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        PipelineId::ALL
            .into_iter()
            .find(|id| id.as_str() == normalized)
            .ok_or_else(|| AgentError::UnknownPipeline(s.to_string()))
    }
}

/// Question shape, used to scale the token ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    YesNo,
    What,
    HowTo,
    Comparison,
    Analysis,
    Other,
}

impl QueryType {
    /// Token multiplier in percent
    pub fn multiplier_percent(&self) -> u32 {
        match self {
            QueryType::YesNo => 70,
            QueryType::What => 85,
            QueryType::HowTo => 120,
            QueryType::Comparison => 130,
            QueryType::Analysis => 140,
            QueryType::Other => 100,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::YesNo => "yes_no",
            QueryType::What => "what",
            QueryType::HowTo => "how_to",
            QueryType::Comparison => "comparison",
            QueryType::Analysis => "analysis",
            QueryType::Other => "other",
        }
    }

    fn is_direct(&self) -> bool {
        matches!(self, QueryType::YesNo | QueryType::What)
    }
}

static YES_NO_LEAD: Pattern = Lazy::new(|| compile(r"(?i)^(is|are|should|can|will|does|do)\s"));
static WHAT_LEAD: Pattern = Lazy::new(|| compile(r"(?i)^what\s"));
static HOW_TO_LEAD: Pattern = Lazy::new(|| compile(r"(?i)^how\s(to|do|can|should)"));
static COMPARISON: Pattern = Lazy::new(|| compile(r"(?i)\b(vs|versus|compare|difference|better)\b"));
static ANALYSIS: Pattern = Lazy::new(|| compile(r"(?i)\b(analyze|evaluate|assess|impact|strategy)\b"));

static COMPLEXITY_WORDS: Pattern =
    Lazy::new(|| compile(r"(?i)\b(detailed|comprehensive|explain|elaborate|analyze|compare)\b"));
static TECHNICAL_TERMS: Pattern = Lazy::new(|| {
    compile(r"(?i)\b(implementation|architecture|framework|methodology|integration)\b")
});
static BUSINESS_METRICS: Pattern =
    Lazy::new(|| compile(r"(?i)\b(roi|metrics|kpi|revenue|growth|conversion|performance)\b"));

/// Classify the question shape. First matching rule wins.
pub fn classify_query(query: &str) -> QueryType {
    let query = query.trim_start();
    if is_match(&YES_NO_LEAD, query) {
        QueryType::YesNo
    } else if is_match(&WHAT_LEAD, query) {
        QueryType::What
    } else if is_match(&HOW_TO_LEAD, query) {
        QueryType::HowTo
    } else if is_match(&COMPARISON, query) {
        QueryType::Comparison
    } else if is_match(&ANALYSIS, query) {
        QueryType::Analysis
    } else {
        QueryType::Other
    }
}

/// Upper bound on the combined token multiplier, in percent
const MAX_MULTIPLIER_PERCENT: u32 = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryAnalysis {
    pub query_type: QueryType,
    /// Final token multiplier in percent, capped at 150
    pub multiplier_percent: u32,
    pub multiple_questions: bool,
}

pub fn analyze_query(query: &str) -> QueryAnalysis {
    let query_type = classify_query(query);
    let multiple_questions = query.matches('?').count() > 1;

    let mut percent = query_type.multiplier_percent();
    if multiple_questions {
        percent += 20;
    }
    if is_match(&COMPLEXITY_WORDS, query) {
        percent += 15;
    }
    if is_match(&TECHNICAL_TERMS, query) {
        percent += 10;
    }
    if is_match(&BUSINESS_METRICS, query) {
        percent += 10;
    }

    QueryAnalysis {
        query_type,
        multiplier_percent: percent.min(MAX_MULTIPLIER_PERCENT),
        multiple_questions,
    }
}

/// Rule-based lint of a finished answer. Telemetry only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityScore {
    pub score: u32,
    pub feedback: Vec<String>,
    pub suggestions: Vec<String>,
}

static YES_NO_QUESTION: Pattern =
    Lazy::new(|| compile(r"(?i)\b(is this|should i|would it be|is it)\b.*\?"));
static WH_QUESTION: Pattern = Lazy::new(|| compile(r"(?i)\b(what|how|why|when|where)\b.*\?"));
static YES_NO_OPENING: Pattern = Lazy::new(|| compile(r"(?i)^(yes|no)\b"));
static STEP_BY_STEP: Pattern =
    Lazy::new(|| compile(r"(?i)actionable steps|step.by.step|implementation"));
static MARKET_ANALYSIS: Pattern = Lazy::new(|| compile(r"(?i)market analysis|competitor|analysis"));
static BENEFITS_AND_CHALLENGES: Pattern =
    Lazy::new(|| compile(r"(?i)benefits.*challenges|advantages.*disadvantages"));
static HEADING_LINE: Pattern = Lazy::new(|| compile(r"(?m)^##?\s+"));
static BULLET_LINE: Pattern = Lazy::new(|| compile(r"(?m)^\s*[•\-\*]\s+"));
static ACTION_WORDS: Pattern = Lazy::new(|| {
    compile(r"(?i)\b(steps?|action|implement|start|begin|next|should|must|can)\b")
});
static BUSINESS_QUERY: Pattern =
    Lazy::new(|| compile(r"(?i)\b(business|company|growth|strategy|plan)\b"));
static ROUTE_LINK: Pattern = Lazy::new(|| compile(r"\[.*?\]\(/.*?\)"));

/// Word budget for basic questions
const BASIC_WORD_LIMIT: usize = 75;
/// Word budget when the pipeline is unknown
const DEFAULT_WORD_LIMIT: usize = 450;

fn add_issue(result: &mut QualityScore, penalty: u32, feedback: String, suggestion: &str) {
    result.score = result.score.saturating_sub(penalty);
    result.feedback.push(feedback);
    result.suggestions.push(suggestion.to_string());
}

pub struct QualityOptimizer {
    voice_token_cap: u32,
    links: Vec<ToolLink>,
}

impl Default for QualityOptimizer {
    fn default() -> Self {
        Self {
            voice_token_cap: voice::TOKEN_CAP,
            links: advisor_config::PostProcessConfig::default().links,
        }
    }
}

impl QualityOptimizer {
    pub fn new(voice_token_cap: u32, links: Vec<ToolLink>) -> Self {
        Self {
            voice_token_cap,
            links,
        }
    }

    pub fn profile(&self, pipeline_id: &str) -> Option<PipelineProfile> {
        pipeline_id.parse::<PipelineId>().ok().map(|id| id.profile())
    }

    /// Generation parameters for one call
    pub fn config_for(&self, pipeline_id: &str, query: &str, surface: Surface) -> GenerationConfig {
        let Some(profile) = self.profile(pipeline_id) else {
            tracing::warn!(pipeline = pipeline_id, "Unknown pipeline, using default config");
            return GenerationConfig::default();
        };

        let analysis = analyze_query(query);
        let mut max_tokens = profile.max_tokens * analysis.multiplier_percent / 100;
        match surface {
            Surface::Voice => max_tokens = max_tokens.min(self.voice_token_cap),
            Surface::Streaming => max_tokens = max_tokens * 90 / 100,
            Surface::Text => {}
        }

        let mut temperature = profile.style.base_temperature();
        if analysis.query_type.is_direct() {
            temperature = (temperature - 0.1).max(0.3);
        } else if analysis.query_type == QueryType::Analysis {
            temperature = (temperature + 0.1).min(0.7);
        }

        let safety_percent = (defaults::TOKEN_SAFETY_RATIO * 100.0).round() as u32;
        let effective_tokens = max_tokens * safety_percent / 100;

        let (top_k, top_p) = if analysis.query_type == QueryType::Analysis {
            (40, 0.9)
        } else {
            (defaults::DEFAULT_TOP_K, defaults::DEFAULT_TOP_P)
        };

        tracing::debug!(
            pipeline = pipeline_id,
            query_type = analysis.query_type.as_str(),
            multiplier_percent = analysis.multiplier_percent,
            max_tokens = effective_tokens,
            temperature,
            surface = %surface,
            "Generation config derived"
        );

        GenerationConfig {
            max_output_tokens: effective_tokens,
            temperature,
            top_k,
            top_p,
        }
    }

    /// Formatting instructions appended to the system prompt
    pub fn prompt_addendum_for(&self, pipeline_id: &str, query: &str, surface: Surface) -> String {
        let mut out = String::new();

        match self.profile(pipeline_id) {
            Some(profile) => {
                out.push_str(&format!(
                    "## Response Quality Principles: {}\n\n",
                    profile.name.to_uppercase()
                ));
                out.push_str("Quality over quantity. Be helpful and concise.\n\n");
                out.push_str("### Principles\n");
                for principle in profile.principles {
                    out.push_str(&format!("- {}\n", principle));
                }
                out.push_str("\n### Style\n");
                for guideline in profile.style.guidelines() {
                    out.push_str(&format!("- {}\n", guideline));
                }
            }
            None => {
                out.push_str("## Response Quality Principles\n\n");
                out.push_str("Provide the most helpful and concise response possible.\n");
            }
        }

        out.push_str(
            "\n### Formatting\n\
             - Start with a one or two sentence summary\n\
             - Use `##` for main headings and `###` for subheadings\n\
             - Use numbered lists for sequential steps and bullet points for related items\n\
             - Use **bold** for key terms\n\
             - Never use emojis\n\
             - Always conclude with a clear, actionable next step\n",
        );

        if classify_query(query) == QueryType::YesNo {
            out.push_str(
                "\n### Direct Answer\nThis is a yes/no question. Begin with \"Yes\" or \"No\", then explain briefly.\n",
            );
        }

        if !self.links.is_empty() {
            out.push_str("\n### Tool Links\nWhen mentioning a tool, link it exactly as shown:\n");
            for link in &self.links {
                out.push_str(&format!("- [{}]({})\n", link.name, link.route));
            }
        }

        match surface {
            Surface::Voice => out.push_str(
                "\n### Voice\n\
                 - Keep the answer under 30 seconds when read aloud (about 75 words)\n\
                 - Use conversational language\n\
                 - Prefer immediate actionability over full coverage\n",
            ),
            Surface::Streaming => out.push_str(
                "\n### Streaming\n\
                 - Front-load the most important information\n\
                 - Use clear section breaks\n",
            ),
            Surface::Text => {}
        }

        out
    }

    /// Lint a finished answer against the pipeline budget and the query shape
    pub fn score(&self, response: &str, pipeline_id: &str, query: &str) -> QualityScore {
        let word_count = response.split_whitespace().count();
        let max_words = self
            .profile(pipeline_id)
            .map(|p| p.max_tokens as usize * 3 / 4)
            .unwrap_or(DEFAULT_WORD_LIMIT);

        let mut result = QualityScore {
            score: 100,
            feedback: Vec::new(),
            suggestions: Vec::new(),
        };

        let yes_no = is_match(&YES_NO_QUESTION, query);
        let basic = yes_no || (is_match(&WH_QUESTION, query) && query.chars().count() < 100);

        if basic && word_count > BASIC_WORD_LIMIT {
            add_issue(
                &mut result,
                30,
                format!(
                    "Response is too long for a basic question ({} words, should be under {})",
                    word_count, BASIC_WORD_LIMIT
                ),
                "Answer the question directly first, then give one or two key points",
            );
        } else if word_count > max_words {
            add_issue(
                &mut result,
                20,
                format!("Response is too long ({} words, target {})", word_count, max_words),
                "Cut explanations down to the key points",
            );
        }

        if yes_no {
            let opening = response.trim_start_matches(|c: char| {
                c.is_whitespace() || matches!(c, '#' | '*' | '_')
            });
            if !is_match(&YES_NO_OPENING, opening) {
                add_issue(
                    &mut result,
                    25,
                    "Yes/No question should start with Yes or No".to_string(),
                    "Begin with \"Yes\" or \"No\" and then explain briefly",
                );
            }
        }

        if basic {
            if is_match(&STEP_BY_STEP, response) {
                add_issue(
                    &mut result,
                    20,
                    "Basic question should not include step-by-step implementation".to_string(),
                    "Drop the implementation steps and answer the question",
                );
            }
            if is_match(&MARKET_ANALYSIS, response) {
                add_issue(
                    &mut result,
                    15,
                    "Basic question should not include market analysis".to_string(),
                    "Drop the market analysis and focus on the direct answer",
                );
            }
            if is_match(&BENEFITS_AND_CHALLENGES, response) {
                add_issue(
                    &mut result,
                    15,
                    "Basic question should not list both benefits and challenges".to_string(),
                    "Answer directly and explain the deciding reason",
                );
            }
        }

        let structured = is_match(&HEADING_LINE, response) || is_match(&BULLET_LINE, response);
        if !structured && word_count > 100 {
            add_issue(
                &mut result,
                15,
                "Response lacks clear structure".to_string(),
                "Add headings or bullet points",
            );
        }

        if !basic && !is_match(&ACTION_WORDS, response) {
            add_issue(
                &mut result,
                10,
                "Response lacks actionable guidance".to_string(),
                "Include specific next steps",
            );
        }

        let business = is_match(&BUSINESS_QUERY, query);
        if business && !basic && word_count > 50 && match_count(&ROUTE_LINK, response) == 0 {
            add_issue(
                &mut result,
                5,
                "Consider adding relevant tool links".to_string(),
                "Link the business tools the answer mentions",
            );
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn optimizer() -> QualityOptimizer {
        QualityOptimizer::default()
    }

    #[test]
    fn test_query_classification_table() {
        let cases = [
            ("Is this a good idea?", QueryType::YesNo),
            ("should we hire now?", QueryType::YesNo),
            ("  Do I need a CRM?", QueryType::YesNo),
            ("What is a scorecard?", QueryType::What),
            ("How to run a weekly meeting", QueryType::HowTo),
            ("How do I delegate better?", QueryType::HowTo),
            ("Quarterly vs annual planning", QueryType::Comparison),
            ("Evaluate our pricing", QueryType::Analysis),
            ("Tell me about onboarding", QueryType::Other),
            ("Island logistics", QueryType::Other),
        ];
        for (query, expected) in cases {
            assert_eq!(classify_query(query), expected, "query: {}", query);
        }
    }

    #[test]
    fn test_multiplier_extras_are_capped() {
        let analysis = analyze_query("Compare the ROI? And explain the implementation?");
        assert!(analysis.multiple_questions);
        assert_eq!(analysis.query_type, QueryType::Comparison);
        assert_eq!(analysis.multiplier_percent, MAX_MULTIPLIER_PERCENT);

        assert_eq!(analyze_query("Is it raining?").multiplier_percent, 70);
    }

    #[test]
    fn test_pipeline_id_parsing() {
        assert_eq!("main-chat".parse::<PipelineId>().unwrap(), PipelineId::MainChat);
        assert_eq!(
            " Websocket-Voice ".parse::<PipelineId>().unwrap(),
            PipelineId::WebsocketVoice
        );
        assert!("sales-chat".parse::<PipelineId>().is_err());
        for id in PipelineId::ALL {
            assert_eq!(id.as_str().parse::<PipelineId>().unwrap(), id);
        }
    }

    #[test]
    fn test_yes_no_text_config() {
        let config = optimizer().config_for("main-chat", "Is this a good idea?", Surface::Text);
        // 500 * 0.7 = 350, then the 0.85 buffer
        assert_eq!(config.max_output_tokens, 297);
        assert!((config.temperature - 0.3).abs() < 1e-6);
        assert_eq!(config.top_k, 32);
        assert!((config.top_p - 0.85).abs() < 1e-6);
    }

    #[test]
    fn test_voice_surface_is_capped() {
        let config =
            optimizer().config_for("voice-chat", "How to hire a sales lead?", Surface::Voice);
        // 450 * 1.2 = 540, capped at 400, then the buffer
        assert_eq!(config.max_output_tokens, 340);
        assert!((config.temperature - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_streaming_surface_is_reduced() {
        let config = optimizer().config_for("main-chat", "Tell me about onboarding", Surface::Streaming);
        // 500 * 0.9 = 450, then the buffer
        assert_eq!(config.max_output_tokens, 382);
    }

    #[test]
    fn test_analysis_config_is_wider() {
        let config = optimizer().config_for(
            "dashboard-chat",
            "Evaluate the impact of our pricing on revenue",
            Surface::Text,
        );
        // 900 * 1.5 = 1350, then the buffer
        assert_eq!(config.max_output_tokens, 1147);
        assert_eq!(config.top_k, 40);
        assert!((config.top_p - 0.9).abs() < 1e-6);
        assert!((config.temperature - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_pipeline_uses_defaults() {
        let config = optimizer().config_for("unknown", "Is this a good idea?", Surface::Voice);
        assert_eq!(config, GenerationConfig::default());
    }

    #[test]
    fn test_addendum_is_deterministic() {
        let opt = optimizer();
        let a = opt.prompt_addendum_for("main-chat", "Is this a good idea?", Surface::Voice);
        let b = opt.prompt_addendum_for("main-chat", "Is this a good idea?", Surface::Voice);
        assert_eq!(a, b);
        assert!(a.contains("MAIN CHAT"));
        assert!(a.contains("Begin with \"Yes\" or \"No\""));
        assert!(a.contains("[Company Scorecard](/company-scorecard)"));
        assert!(a.contains("### Voice"));

        let other = opt.prompt_addendum_for("unknown", "Plan my week", Surface::Text);
        assert!(!other.contains("Direct Answer"));
        assert!(!other.contains("### Voice"));
    }

    #[test]
    fn test_score_flags_indirect_yes_no_answer() {
        let opt = optimizer();
        let query = "Is this a good idea?";

        let indirect = opt.score(
            "It depends on your cash position and hiring plan.",
            "main-chat",
            query,
        );
        assert_eq!(indirect.score, 75);
        assert!(indirect.feedback.iter().any(|f| f.contains("Yes or No")));

        let direct = opt.score(
            "Yes. Your cash position supports it this quarter.",
            "main-chat",
            query,
        );
        assert_eq!(direct.score, 100);

        let bold = opt.score("**No.** Wait until revenue stabilises.", "main-chat", query);
        assert!(!bold.feedback.iter().any(|f| f.contains("Yes or No")));
    }

    #[test]
    fn test_score_long_unstructured_business_answer() {
        let body = "We will grow revenue through better retention and pricing discipline. ".repeat(12);
        let score = optimizer().score(&body, "content-generation", "Improve our business growth plan");
        // 120 words fits the budget; loses points for structure, actions and links
        assert_eq!(score.score, 70);
        assert_eq!(score.feedback.len(), 3);
    }

    #[test]
    fn test_score_never_below_zero() {
        let body = format!(
            "It depends. Market analysis shows benefits and challenges. Step by step implementation. {}",
            "word ".repeat(400)
        );
        let score = optimizer().score(&body, "main-chat", "Is it worth it?");
        assert!(score.score <= 10);
    }
}
