//! Ordered provider fallback
//!
//! The fast provider is tried first, then each fallback in order. Nothing is
//! returned until one provider has produced a complete answer, so a failing
//! provider never leaks partial output.

use std::sync::Arc;
use std::time::Instant;

use advisor_core::{Error, GenerationConfig, LanguageModel, Message, Result};

/// Result of a successful chain call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutcome {
    pub text: String,
    pub provider: String,
    pub model: String,
    /// Position of the provider that answered (0 = primary)
    pub index: usize,
    pub elapsed_ms: u64,
}

impl GenerationOutcome {
    /// True when the primary provider did not answer
    pub fn used_fallback(&self) -> bool {
        self.index > 0
    }
}

#[derive(Clone)]
pub struct ProviderChain {
    providers: Vec<Arc<dyn LanguageModel>>,
}

impl ProviderChain {
    pub fn new(primary: Arc<dyn LanguageModel>) -> Self {
        Self {
            providers: vec![primary],
        }
    }

    pub fn with_fallback(mut self, provider: Arc<dyn LanguageModel>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn from_providers(providers: Vec<Arc<dyn LanguageModel>>) -> Self {
        Self { providers }
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Primary provider, used for cheap auxiliary calls (outlines, titles)
    pub fn primary(&self) -> Option<&Arc<dyn LanguageModel>> {
        self.providers.first()
    }

    pub async fn generate(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> Result<GenerationOutcome> {
        let start = Instant::now();
        let mut last_error: Option<Error> = None;

        for (index, provider) in self.providers.iter().enumerate() {
            match provider.generate(messages, config).await {
                Ok(text) => {
                    if index > 0 {
                        tracing::info!(
                            provider = provider.provider_name(),
                            model = provider.model_name(),
                            index,
                            "Fallback provider answered"
                        );
                    }
                    return Ok(GenerationOutcome {
                        text,
                        provider: provider.provider_name().to_string(),
                        model: provider.model_name().to_string(),
                        index,
                        elapsed_ms: start.elapsed().as_millis() as u64,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        provider = provider.provider_name(),
                        model = provider.model_name(),
                        error = %e,
                        "Provider failed, trying next"
                    );
                    metrics::counter!(
                        "advisor_provider_failures_total",
                        "provider" => provider.provider_name().to_string(),
                        "kind" => e.kind()
                    )
                    .increment(1);
                    last_error = Some(e);
                }
            }
        }

        metrics::counter!("advisor_generation_exhausted_total").increment(1);
        Err(Error::GenerationExhausted {
            attempted: self.providers.len(),
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no providers configured".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct MockModel {
        name: &'static str,
        reply: Option<&'static str>,
        calls: Mutex<usize>,
    }

    impl MockModel {
        fn ok(name: &'static str, reply: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                reply: Some(reply),
                calls: Mutex::new(0),
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                reply: None,
                calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl LanguageModel for MockModel {
        async fn generate(&self, _: &[Message], _: &GenerationConfig) -> Result<String> {
            *self.calls.lock() += 1;
            self.reply
                .map(str::to_string)
                .ok_or_else(|| Error::unavailable(self.name, "down"))
        }

        fn model_name(&self) -> &str {
            self.name
        }

        fn provider_name(&self) -> &str {
            self.name
        }
    }

    #[tokio::test]
    async fn test_primary_answers() {
        let fast = MockModel::ok("fast", "quick answer");
        let quality = MockModel::ok("quality", "slow answer");
        let chain = ProviderChain::new(fast.clone()).with_fallback(quality.clone());

        let outcome = chain
            .generate(&[Message::user("q")], &GenerationConfig::default())
            .await
            .unwrap();
        assert_eq!(outcome.text, "quick answer");
        assert!(!outcome.used_fallback());
        assert_eq!(*quality.calls.lock(), 0);
    }

    #[tokio::test]
    async fn test_falls_back_to_quality() {
        let fast = MockModel::failing("fast");
        let quality = MockModel::ok("quality", "slow answer");
        let chain = ProviderChain::new(fast.clone()).with_fallback(quality.clone());

        let outcome = chain
            .generate(&[Message::user("q")], &GenerationConfig::default())
            .await
            .unwrap();
        assert_eq!(outcome.provider, "quality");
        assert!(outcome.used_fallback());
        assert_eq!(*fast.calls.lock(), 1);
    }

    #[tokio::test]
    async fn test_all_fail_is_exhausted() {
        let chain = ProviderChain::new(MockModel::failing("fast"))
            .with_fallback(MockModel::failing("quality"));

        let err = chain
            .generate(&[Message::user("q")], &GenerationConfig::default())
            .await
            .unwrap_err();
        match err {
            Error::GenerationExhausted { attempted, last_error } => {
                assert_eq!(attempted, 2);
                assert!(last_error.contains("quality"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_empty_chain_is_exhausted() {
        let chain = ProviderChain::from_providers(Vec::new());
        assert!(chain.is_empty());
        let err = chain
            .generate(&[], &GenerationConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "generation_exhausted");
    }
}
