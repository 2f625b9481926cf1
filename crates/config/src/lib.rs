//! Configuration management for the advisor pipeline
//!
//! Supports loading configuration from:
//! - YAML/TOML files under `config/` (`default.*`, then `{env}.*`)
//! - Environment variables (`ADVISOR__` prefix, `__` as section separator)
//!
//! Every field has a default taken from [`constants`], so an empty
//! config directory yields a working setup.

pub mod constants;
pub mod settings;

pub use settings::{
    load_settings, load_settings_from, EmbeddingSettings, HistoryConfig, LlmProviderSettings,
    ObservabilityConfig, PlannerConfig, PostProcessConfig, ProvidersConfig, RagConfig,
    RetryConfig, RuntimeEnvironment, ServerConfig, Settings, SttSettings, ToolAlias, ToolLink,
    TtsSettings, VoiceSettings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(key) => ConfigError::MissingField(key),
            other => ConfigError::ParseError(other.to_string()),
        }
    }
}
