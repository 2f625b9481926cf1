//! Language-model and transcription providers
//!
//! Features:
//! - OpenAI-compatible chat completions backend (Groq, OpenAI, Ollama)
//! - Whisper-style transcription backend
//! - Rate-limit retry with exponential backoff
//! - Ordered provider fallback chain
//! - Prompt assembly

pub mod backend;
pub mod chain;
pub mod factory;
pub mod prompt;
pub mod retry;
pub mod transcriber;

pub use backend::{ChatBackendConfig, ChatCompletionsBackend};
pub use chain::{GenerationOutcome, ProviderChain};
pub use factory::{LlmFactory, LlmProvider};
pub use prompt::{PromptBuilder, DEFAULT_SYSTEM_PROMPT};
pub use retry::{RetryPolicy, RetryingModel, RetryingTranscriber};
pub use transcriber::{TranscriberConfig, WhisperTranscriber};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl LlmError {
    /// Attach the provider name while converting into the shared taxonomy
    pub fn into_core(self, provider: &str) -> advisor_core::Error {
        match self {
            LlmError::RateLimited(msg) => advisor_core::Error::rate_limited(provider, msg),
            LlmError::Configuration(msg) => advisor_core::Error::Config(msg),
            other => advisor_core::Error::unavailable(provider, other.to_string()),
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else if err.status().map(|s| s.as_u16()) == Some(429) {
            LlmError::RateLimited(err.to_string())
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for advisor_core::Error {
    fn from(err: LlmError) -> Self {
        err.into_core("llm")
    }
}
