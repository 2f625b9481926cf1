//! Centralized defaults for the advisor pipeline
//!
//! Single source of truth for every tunable number. Settings fall back to
//! these, and crates that run without a `Settings` instance use them directly.

/// Retrieval cascade
pub mod rag {
    /// Stage A similarity cutoff
    pub const HIGH_CONFIDENCE_THRESHOLD: f32 = 0.7;

    /// Stage B similarity cutoff
    pub const MEDIUM_CONFIDENCE_THRESHOLD: f32 = 0.6;

    pub const TARGET_MIN: usize = 3;
    pub const TARGET_MAX: usize = 5;

    /// Categories that are always eligible for the safety net
    pub const CORE_CATEGORIES: &[&str] = &["core", "formatting", "tone"];

    /// Hash embedder width
    pub const EMBEDDING_DIM: usize = 384;

    pub const KNOWLEDGE_PATH: &str = "knowledge";
}

/// Response planner
pub mod planner {
    /// Split when the estimate exceeds this share of the token budget
    pub const SPLIT_RATIO: f32 = 0.85;

    pub const OUTLINE_MAX_TOKENS: u32 = 100;
    pub const OUTLINE_TEMPERATURE: f32 = 0.3;
    pub const OUTLINE_TOP_P: f32 = 0.8;

    /// Rough characters per output token, for spotting answers cut at the limit
    pub const CHARS_PER_TOKEN: f32 = 3.5;
    /// Token share, in percent, for the compressed retry of a truncated answer
    pub const COMPRESSED_TOKEN_PERCENT: u32 = 75;
    /// Outline points kept in the compressed retry
    pub const COMPRESSED_POINTS: usize = 2;
    /// Appended to part one of a split answer that ran out of room
    pub const CONTINUATION_MARKER: &str = "[Continued in Part 2...]";
}

/// Provider retry policy
pub mod retry {
    pub const GENERATION_ATTEMPTS: u32 = 3;
    /// Base for `2^attempt * base` backoff
    pub const GENERATION_BACKOFF_BASE_MS: u64 = 1_000;

    pub const TRANSCRIPTION_ATTEMPTS: u32 = 2;
    pub const TRANSCRIPTION_DELAY_MS: u64 = 1_000;
}

/// Service endpoints (defaults for local development)
pub mod endpoints {
    pub const GROQ_DEFAULT: &str = "https://api.groq.com/openai/v1";
    pub const OPENAI_DEFAULT: &str = "https://api.openai.com/v1";
    pub const DEEPGRAM_SPEAK_DEFAULT: &str = "https://api.deepgram.com/v1/speak";
}

/// Default models
pub mod models {
    pub const FAST: &str = "llama-3.1-8b-instant";
    pub const QUALITY: &str = "llama-3.3-70b-versatile";
    pub const TRANSCRIPTION: &str = "whisper-large-v3-turbo";
    pub const EMBEDDING: &str = "text-embedding-3-small";
}

/// Timeouts (milliseconds)
pub mod timeouts {
    pub const LLM_REQUEST_MS: u64 = 60_000;
    pub const STT_REQUEST_MS: u64 = 30_000;
    pub const TTS_REQUEST_MS: u64 = 30_000;
}

/// Response post-processing
pub mod post_process {
    pub const MAX_WORDS: usize = 350;
    pub const MAX_CHARS: usize = 1_800;
    /// Sections are kept up to this share of the budget
    pub const TRIM_RATIO: f32 = 0.85;
    /// A partial section is only worth keeping above this many words
    pub const MIN_PARTIAL_WORDS: usize = 20;
    /// Below this length section trimming falls back to sentences
    pub const MIN_SECTION_RESULT_CHARS: usize = 100;

    /// Canonical tool name to route
    pub const TOOL_LINKS: &[(&str, &str)] = &[
        ("Company Scorecard", "/company-scorecard"),
        ("Chain of Command", "/chain-of-command"),
        ("Growth Machine Planner", "/growth-machine-planner"),
        ("Growth Machine", "/growth-machine"),
        ("Battle Plan", "/battle-plan"),
        ("Meeting Rhythm Planner", "/meeting-rhythm-planner"),
        ("Quarterly Sprint Canvas", "/quarterly-sprint-canvas"),
        ("Fulfillment Machine Planner", "/fulfillment-machine-planner"),
        ("Fulfillment Machine", "/fulfillment-machine"),
        ("Innovation Machine", "/innovation-machine"),
        ("Triage Planner", "/triage-planner"),
        ("SOP Creator", "/sop"),
    ];

    /// Legacy names rewritten to a canonical link
    pub const TOOL_ALIASES: &[(&str, &str)] = &[("Command HQ", "Company Scorecard")];
}

/// Voice pipeline
pub mod voice {
    pub const TIER_EXCELLENT_MS: u64 = 3_000;
    pub const TIER_GOOD_MS: u64 = 5_000;
    pub const TIER_FAIR_MS: u64 = 8_000;

    /// Output ceiling for spoken answers
    pub const TOKEN_CAP: u32 = 400;

    /// Longest text sent to synthesis
    pub const SPEECH_CHAR_LIMIT: usize = 1_950;

    pub const DEFAULT_VOICE: &str = "aura-asteria-en";
    pub const DEFAULT_ACCENT: &str = "US";
    pub const DEFAULT_GENDER: &str = "female";

    /// Transcript used when every transcription attempt failed
    pub const TRANSCRIPTION_PLACEHOLDER: &str = "Hello, I couldn't transcribe your audio";

    /// Per-stage latency targets used for bottleneck reporting
    pub const TARGET_TRANSCRIPTION_MS: u64 = 800;
    pub const TARGET_GENERATION_MS: u64 = 1_500;
    pub const TARGET_SYNTHESIS_MS: u64 = 600;
}

/// Chat history
pub mod history {
    pub const MAX_TURNS: usize = 50;
    /// Turns of the current instance included as generation context
    pub const CONTEXT_TURNS: usize = 6;
    pub const TITLE_MAX_WORDS: usize = 6;
}

/// Pipeline profiles
pub mod pipeline {
    pub const DEFAULT_PIPELINE: &str = "main-chat";
    pub const DEFAULT_MAX_TOKENS: u32 = 600;
    pub const DEFAULT_TEMPERATURE: f32 = 0.4;
    pub const DEFAULT_TOP_K: u32 = 32;
    pub const DEFAULT_TOP_P: f32 = 0.85;
    /// Safety buffer applied to every computed token ceiling
    pub const TOKEN_SAFETY_RATIO: f32 = 0.85;
}

/// Fixed user-facing text
pub mod messages {
    pub const GENERATION_APOLOGY: &str = "I apologize, but I'm having trouble generating a \
        response right now. Please try again in a moment.";
}
