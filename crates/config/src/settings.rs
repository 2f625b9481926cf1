//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::constants::{
    endpoints, history, models, planner, post_process, rag, retry, timeouts, voice,
};
use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    /// Retrieval cascade thresholds and targets
    #[serde(default)]
    pub rag: RagConfig,

    #[serde(default)]
    pub planner: PlannerConfig,

    /// LM, STT, TTS and embedding backends plus retry policy
    #[serde(default)]
    pub providers: ProvidersConfig,

    #[serde(default)]
    pub post_process: PostProcessConfig,

    #[serde(default)]
    pub voice: VoiceSettings,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_rag()?;
        self.validate_planner()?;
        self.validate_retry()?;
        self.validate_post_process()?;
        self.validate_voice()?;
        Ok(())
    }

    fn validate_rag(&self) -> Result<(), ConfigError> {
        let rag = &self.rag;

        for (field, value) in [
            ("rag.high_confidence_threshold", rag.high_confidence_threshold),
            ("rag.medium_confidence_threshold", rag.medium_confidence_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("Must be between 0.0 and 1.0, got {}", value),
                });
            }
        }

        if rag.medium_confidence_threshold > rag.high_confidence_threshold {
            return Err(ConfigError::InvalidValue {
                field: "rag.medium_confidence_threshold".to_string(),
                message: format!(
                    "Must not exceed high_confidence_threshold ({})",
                    rag.high_confidence_threshold
                ),
            });
        }

        if rag.target_max == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rag.target_max".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if rag.target_min > rag.target_max {
            return Err(ConfigError::InvalidValue {
                field: "rag.target_min".to_string(),
                message: format!(
                    "Must not exceed target_max ({}), got {}",
                    rag.target_max, rag.target_min
                ),
            });
        }

        Ok(())
    }

    fn validate_planner(&self) -> Result<(), ConfigError> {
        let ratio = self.planner.split_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "planner.split_ratio".to_string(),
                message: format!("Must be in (0.0, 1.0], got {}", ratio),
            });
        }
        Ok(())
    }

    fn validate_retry(&self) -> Result<(), ConfigError> {
        let retry = &self.providers.retry;
        if retry.generation_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "providers.retry.generation_attempts".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }
        if retry.transcription_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "providers.retry.transcription_attempts".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    fn validate_post_process(&self) -> Result<(), ConfigError> {
        let ratio = self.post_process.trim_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "post_process.trim_ratio".to_string(),
                message: format!("Must be in (0.0, 1.0], got {}", ratio),
            });
        }
        if self.post_process.max_words == 0 {
            return Err(ConfigError::InvalidValue {
                field: "post_process.max_words".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    fn validate_voice(&self) -> Result<(), ConfigError> {
        let v = &self.voice;
        if !(v.tier_excellent_ms < v.tier_good_ms && v.tier_good_ms < v.tier_fair_ms) {
            return Err(ConfigError::InvalidValue {
                field: "voice.tier_*_ms".to_string(),
                message: format!(
                    "Tier bounds must increase, got {}/{}/{}",
                    v.tier_excellent_ms, v.tier_good_ms, v.tier_fair_ms
                ),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_enabled: true,
            cors_origins: Vec::new(),
        }
    }
}

/// Retrieval cascade configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default = "default_high_threshold")]
    pub high_confidence_threshold: f32,

    #[serde(default = "default_medium_threshold")]
    pub medium_confidence_threshold: f32,

    #[serde(default = "default_target_min")]
    pub target_min: usize,

    #[serde(default = "default_target_max")]
    pub target_max: usize,

    #[serde(default = "default_core_categories")]
    pub core_categories: Vec<String>,

    /// Directory of YAML/JSON instruction files loaded at startup
    #[serde(default = "default_knowledge_path")]
    pub knowledge_path: String,
}

fn default_high_threshold() -> f32 {
    rag::HIGH_CONFIDENCE_THRESHOLD
}
fn default_medium_threshold() -> f32 {
    rag::MEDIUM_CONFIDENCE_THRESHOLD
}
fn default_target_min() -> usize {
    rag::TARGET_MIN
}
fn default_target_max() -> usize {
    rag::TARGET_MAX
}
fn default_core_categories() -> Vec<String> {
    rag::CORE_CATEGORIES.iter().map(|c| c.to_string()).collect()
}
fn default_knowledge_path() -> String {
    rag::KNOWLEDGE_PATH.to_string()
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            high_confidence_threshold: default_high_threshold(),
            medium_confidence_threshold: default_medium_threshold(),
            target_min: default_target_min(),
            target_max: default_target_max(),
            core_categories: default_core_categories(),
            knowledge_path: default_knowledge_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default = "default_split_ratio")]
    pub split_ratio: f32,

    #[serde(default = "default_outline_max_tokens")]
    pub outline_max_tokens: u32,

    #[serde(default = "default_outline_temperature")]
    pub outline_temperature: f32,
}

fn default_split_ratio() -> f32 {
    planner::SPLIT_RATIO
}
fn default_outline_max_tokens() -> u32 {
    planner::OUTLINE_MAX_TOKENS
}
fn default_outline_temperature() -> f32 {
    planner::OUTLINE_TEMPERATURE
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            split_ratio: default_split_ratio(),
            outline_max_tokens: default_outline_max_tokens(),
            outline_temperature: default_outline_temperature(),
        }
    }
}

/// Backends for every external capability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Low-latency model, tried first
    #[serde(default = "default_fast_provider")]
    pub fast: LlmProviderSettings,

    /// Higher-quality model, used when the fast one fails
    #[serde(default = "default_quality_provider")]
    pub quality: LlmProviderSettings,

    #[serde(default)]
    pub stt: SttSettings,

    #[serde(default)]
    pub tts: TtsSettings,

    #[serde(default)]
    pub embedding: EmbeddingSettings,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            fast: default_fast_provider(),
            quality: default_quality_provider(),
            stt: SttSettings::default(),
            tts: TtsSettings::default(),
            embedding: EmbeddingSettings::default(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_fast_provider() -> LlmProviderSettings {
    LlmProviderSettings {
        provider: "groq".to_string(),
        model: models::FAST.to_string(),
        ..Default::default()
    }
}

fn default_quality_provider() -> LlmProviderSettings {
    LlmProviderSettings {
        provider: "groq".to_string(),
        model: models::QUALITY.to_string(),
        ..Default::default()
    }
}

/// One language-model backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmProviderSettings {
    /// "groq", "openai" or "ollama"
    #[serde(default = "default_provider_name")]
    pub provider: String,

    /// Overrides the provider's default endpoint
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Falls back to the provider's conventional env var when unset
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_fast_model")]
    pub model: String,

    #[serde(default = "default_llm_timeout")]
    pub timeout_ms: u64,
}

fn default_provider_name() -> String {
    "groq".to_string()
}
fn default_fast_model() -> String {
    models::FAST.to_string()
}
fn default_llm_timeout() -> u64 {
    timeouts::LLM_REQUEST_MS
}

impl Default for LlmProviderSettings {
    fn default() -> Self {
        Self {
            provider: default_provider_name(),
            endpoint: None,
            api_key: None,
            model: default_fast_model(),
            timeout_ms: default_llm_timeout(),
        }
    }
}

/// Speech-to-text backend (OpenAI-compatible transcriptions API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_stt_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_stt_model")]
    pub model: String,

    #[serde(default = "default_stt_timeout")]
    pub timeout_ms: u64,
}

fn default_stt_endpoint() -> String {
    endpoints::GROQ_DEFAULT.to_string()
}
fn default_stt_model() -> String {
    models::TRANSCRIPTION.to_string()
}
fn default_stt_timeout() -> u64 {
    timeouts::STT_REQUEST_MS
}

impl Default for SttSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_stt_endpoint(),
            api_key: None,
            model: default_stt_model(),
            timeout_ms: default_stt_timeout(),
        }
    }
}

/// Text-to-speech backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_tts_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_tts_timeout")]
    pub timeout_ms: u64,
}

fn default_tts_endpoint() -> String {
    endpoints::DEEPGRAM_SPEAK_DEFAULT.to_string()
}
fn default_tts_timeout() -> u64 {
    timeouts::TTS_REQUEST_MS
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_tts_endpoint(),
            api_key: None,
            timeout_ms: default_tts_timeout(),
        }
    }
}

/// Embedding backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    /// "hash" (deterministic, offline) or "http" (OpenAI-compatible)
    #[serde(default = "default_embedding_kind")]
    pub kind: String,

    #[serde(default = "default_embedding_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_embedding_dim")]
    pub dimension: usize,
}

fn default_embedding_kind() -> String {
    "hash".to_string()
}
fn default_embedding_endpoint() -> String {
    endpoints::OPENAI_DEFAULT.to_string()
}
fn default_embedding_model() -> String {
    models::EMBEDDING.to_string()
}
fn default_embedding_dim() -> usize {
    rag::EMBEDDING_DIM
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            kind: default_embedding_kind(),
            endpoint: default_embedding_endpoint(),
            api_key: None,
            model: default_embedding_model(),
            dimension: default_embedding_dim(),
        }
    }
}

/// Retry policy for provider calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_generation_attempts")]
    pub generation_attempts: u32,

    #[serde(default = "default_generation_backoff")]
    pub generation_backoff_base_ms: u64,

    #[serde(default = "default_transcription_attempts")]
    pub transcription_attempts: u32,

    #[serde(default = "default_transcription_delay")]
    pub transcription_delay_ms: u64,
}

fn default_generation_attempts() -> u32 {
    retry::GENERATION_ATTEMPTS
}
fn default_generation_backoff() -> u64 {
    retry::GENERATION_BACKOFF_BASE_MS
}
fn default_transcription_attempts() -> u32 {
    retry::TRANSCRIPTION_ATTEMPTS
}
fn default_transcription_delay() -> u64 {
    retry::TRANSCRIPTION_DELAY_MS
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            generation_attempts: default_generation_attempts(),
            generation_backoff_base_ms: default_generation_backoff(),
            transcription_attempts: default_transcription_attempts(),
            transcription_delay_ms: default_transcription_delay(),
        }
    }
}

/// Canonical tool link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolLink {
    pub name: String,
    pub route: String,
}

/// Legacy tool name rewritten to a canonical one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolAlias {
    pub name: String,
    pub canonical: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostProcessConfig {
    #[serde(default = "default_max_words")]
    pub max_words: usize,

    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    #[serde(default = "default_trim_ratio")]
    pub trim_ratio: f32,

    #[serde(default = "default_tool_links")]
    pub links: Vec<ToolLink>,

    #[serde(default = "default_tool_aliases")]
    pub aliases: Vec<ToolAlias>,
}

fn default_max_words() -> usize {
    post_process::MAX_WORDS
}
fn default_max_chars() -> usize {
    post_process::MAX_CHARS
}
fn default_trim_ratio() -> f32 {
    post_process::TRIM_RATIO
}
fn default_tool_links() -> Vec<ToolLink> {
    post_process::TOOL_LINKS
        .iter()
        .map(|(name, route)| ToolLink {
            name: name.to_string(),
            route: route.to_string(),
        })
        .collect()
}
fn default_tool_aliases() -> Vec<ToolAlias> {
    post_process::TOOL_ALIASES
        .iter()
        .map(|(name, canonical)| ToolAlias {
            name: name.to_string(),
            canonical: canonical.to_string(),
        })
        .collect()
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            max_words: default_max_words(),
            max_chars: default_max_chars(),
            trim_ratio: default_trim_ratio(),
            links: default_tool_links(),
            aliases: default_tool_aliases(),
        }
    }
}

/// Voice pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSettings {
    #[serde(default = "default_tier_excellent")]
    pub tier_excellent_ms: u64,

    #[serde(default = "default_tier_good")]
    pub tier_good_ms: u64,

    #[serde(default = "default_tier_fair")]
    pub tier_fair_ms: u64,

    #[serde(default = "default_token_cap")]
    pub token_cap: u32,

    #[serde(default = "default_speech_char_limit")]
    pub speech_char_limit: usize,

    #[serde(default = "default_accent")]
    pub default_accent: String,

    #[serde(default = "default_gender")]
    pub default_gender: String,

    #[serde(default = "default_target_transcription")]
    pub target_transcription_ms: u64,

    #[serde(default = "default_target_generation")]
    pub target_generation_ms: u64,

    #[serde(default = "default_target_synthesis")]
    pub target_synthesis_ms: u64,
}

fn default_tier_excellent() -> u64 {
    voice::TIER_EXCELLENT_MS
}
fn default_tier_good() -> u64 {
    voice::TIER_GOOD_MS
}
fn default_tier_fair() -> u64 {
    voice::TIER_FAIR_MS
}
fn default_token_cap() -> u32 {
    voice::TOKEN_CAP
}
fn default_speech_char_limit() -> usize {
    voice::SPEECH_CHAR_LIMIT
}
fn default_accent() -> String {
    voice::DEFAULT_ACCENT.to_string()
}
fn default_gender() -> String {
    voice::DEFAULT_GENDER.to_string()
}
fn default_target_transcription() -> u64 {
    voice::TARGET_TRANSCRIPTION_MS
}
fn default_target_generation() -> u64 {
    voice::TARGET_GENERATION_MS
}
fn default_target_synthesis() -> u64 {
    voice::TARGET_SYNTHESIS_MS
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            tier_excellent_ms: default_tier_excellent(),
            tier_good_ms: default_tier_good(),
            tier_fair_ms: default_tier_fair(),
            token_cap: default_token_cap(),
            speech_char_limit: default_speech_char_limit(),
            default_accent: default_accent(),
            default_gender: default_gender(),
            target_transcription_ms: default_target_transcription(),
            target_generation_ms: default_target_generation(),
            target_synthesis_ms: default_target_synthesis(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    #[serde(default = "default_context_turns")]
    pub context_turns: usize,

    #[serde(default = "default_title_max_words")]
    pub title_max_words: usize,
}

fn default_max_turns() -> usize {
    history::MAX_TURNS
}
fn default_context_turns() -> usize {
    history::CONTEXT_TURNS
}
fn default_title_max_words() -> usize {
    history::TITLE_MAX_WORDS
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            context_turns: default_context_turns(),
            title_max_words: default_title_max_words(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

/// Load settings from `config/` and the environment
///
/// Priority: env vars (`ADVISOR__SECTION__KEY`) > config/{env}.* > config/default.* > defaults
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from(Path::new("config"), env)
}

/// Same as [`load_settings`] with an explicit config directory
pub fn load_settings_from(config_dir: &Path, env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::from(config_dir.join("default")).required(false));

    if let Some(env_name) = env {
        builder = builder.add_source(File::from(config_dir.join(env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("ADVISOR")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    tracing::debug!(
        dir = %config_dir.display(),
        env = env.unwrap_or("default"),
        "Settings loaded"
    );

    Ok(settings)
}
