//! LLM Factory - Provider Abstraction Layer
//!
//! Creates language-model and transcription backends from settings, wraps
//! them in retry policies, and assembles the fast → quality fallback chain.
//!
//! ## Supported Providers
//! - **Groq**: hosted Llama models and Whisper, key from `GROQ_API_KEY`
//! - **OpenAI**: key from `OPENAI_API_KEY`
//! - **Ollama**: local OpenAI-compatible endpoint, no key

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use advisor_config::{LlmProviderSettings, ProvidersConfig, RetryConfig, SttSettings};
use advisor_core::{LanguageModel, SpeechToText};

use crate::{
    backend::{ChatBackendConfig, ChatCompletionsBackend},
    chain::ProviderChain,
    retry::{RetryPolicy, RetryingModel, RetryingTranscriber},
    transcriber::{TranscriberConfig, WhisperTranscriber},
    LlmError,
};

/// LLM provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProvider {
    #[default]
    Groq,
    OpenAI,
    Ollama,
}

impl FromStr for LlmProvider {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "groq" => Ok(LlmProvider::Groq),
            "openai" | "gpt" => Ok(LlmProvider::OpenAI),
            "ollama" | "local" => Ok(LlmProvider::Ollama),
            other => Err(LlmError::Configuration(format!("Unknown provider: {}", other))),
        }
    }
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::Groq => "groq",
            LlmProvider::OpenAI => "openai",
            LlmProvider::Ollama => "ollama",
        }
    }

    pub fn default_endpoint(&self) -> &'static str {
        use advisor_config::constants::endpoints;
        match self {
            LlmProvider::Groq => endpoints::GROQ_DEFAULT,
            LlmProvider::OpenAI => endpoints::OPENAI_DEFAULT,
            LlmProvider::Ollama => "http://localhost:11434/v1",
        }
    }

    /// Conventional environment variable holding the API key
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            LlmProvider::Groq => Some("GROQ_API_KEY"),
            LlmProvider::OpenAI => Some("OPENAI_API_KEY"),
            LlmProvider::Ollama => None,
        }
    }

    fn resolve_api_key(&self, configured: Option<&str>) -> Option<String> {
        configured
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .or_else(|| self.api_key_env().and_then(|var| std::env::var(var).ok()))
    }
}

pub struct LlmFactory;

impl LlmFactory {
    /// Create a bare backend
    pub fn create(settings: &LlmProviderSettings) -> Result<Arc<dyn LanguageModel>, LlmError> {
        let provider: LlmProvider = settings.provider.parse()?;
        let endpoint = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| provider.default_endpoint().to_string());

        let mut config = ChatBackendConfig::new(provider.as_str(), endpoint, settings.model.clone())
            .with_timeout(Duration::from_millis(settings.timeout_ms));
        if let Some(key) = provider.resolve_api_key(settings.api_key.as_deref()) {
            config = config.with_api_key(key);
        }

        tracing::info!(
            provider = provider.as_str(),
            model = %settings.model,
            "Creating language model backend"
        );

        Ok(Arc::new(ChatCompletionsBackend::new(config)?))
    }

    /// Create a backend wrapped in the generation retry policy
    pub fn create_with_retry(
        settings: &LlmProviderSettings,
        retry: &RetryConfig,
    ) -> Result<Arc<dyn LanguageModel>, LlmError> {
        let inner = Self::create(settings)?;
        Ok(Arc::new(RetryingModel::new(
            inner,
            RetryPolicy::for_generation(retry),
        )))
    }

    /// Fast provider first, quality provider second. Providers that cannot
    /// be created are skipped; an empty chain answers with
    /// `GenerationExhausted` on every call.
    pub fn create_chain(providers: &ProvidersConfig) -> ProviderChain {
        let mut chain = Vec::new();
        for (role, settings) in [("fast", &providers.fast), ("quality", &providers.quality)] {
            match Self::create_with_retry(settings, &providers.retry) {
                Ok(model) => chain.push(model),
                Err(e) => tracing::warn!(role, error = %e, "Language model unavailable"),
            }
        }
        if chain.is_empty() {
            tracing::warn!("No language model configured; responses will use the fallback message");
        }
        ProviderChain::from_providers(chain)
    }

    /// Transcriber with the fixed-delay retry policy, or `None` when disabled
    pub fn create_transcriber(
        settings: &SttSettings,
        retry: &RetryConfig,
    ) -> Result<Option<Arc<dyn SpeechToText>>, LlmError> {
        if !settings.enabled {
            return Ok(None);
        }

        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("GROQ_API_KEY").ok());

        let stt = WhisperTranscriber::new(TranscriberConfig {
            endpoint: settings.endpoint.clone(),
            api_key,
            model: settings.model.clone(),
            timeout: Duration::from_millis(settings.timeout_ms),
            ..Default::default()
        })?;

        Ok(Some(Arc::new(RetryingTranscriber::new(
            Arc::new(stt),
            RetryPolicy::for_transcription(retry),
        ))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_from_str() {
        assert_eq!("groq".parse::<LlmProvider>().unwrap(), LlmProvider::Groq);
        assert_eq!("OpenAI".parse::<LlmProvider>().unwrap(), LlmProvider::OpenAI);
        assert_eq!("local".parse::<LlmProvider>().unwrap(), LlmProvider::Ollama);
        assert!("claude".parse::<LlmProvider>().is_err());
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let settings = LlmProviderSettings {
            provider: "ollama".into(),
            model: "qwen2.5:7b".into(),
            ..Default::default()
        };
        let model = LlmFactory::create(&settings).unwrap();
        assert_eq!(model.provider_name(), "ollama");
        assert_eq!(model.model_name(), "qwen2.5:7b");
    }

    #[test]
    fn test_configured_key_wins() {
        let settings = LlmProviderSettings {
            provider: "openai".into(),
            api_key: Some("sk-test".into()),
            model: "gpt-4o-mini".into(),
            ..Default::default()
        };
        let model = LlmFactory::create_with_retry(&settings, &RetryConfig::default()).unwrap();
        assert_eq!(model.provider_name(), "openai");
    }

    #[test]
    fn test_chain_with_local_providers() {
        let local = LlmProviderSettings {
            provider: "ollama".into(),
            ..Default::default()
        };
        let providers = ProvidersConfig {
            fast: local.clone(),
            quality: local,
            ..Default::default()
        };
        assert_eq!(LlmFactory::create_chain(&providers).len(), 2);
    }

    #[test]
    fn test_disabled_transcriber() {
        let settings = SttSettings {
            enabled: false,
            ..Default::default()
        };
        assert!(LlmFactory::create_transcriber(&settings, &RetryConfig::default())
            .unwrap()
            .is_none());
    }
}
