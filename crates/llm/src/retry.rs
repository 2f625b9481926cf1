//! Retry wrappers for provider calls
//!
//! Only rate-limit errors are retried. Everything else aborts immediately so
//! the caller can move on to the next provider.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use advisor_config::RetryConfig;
use advisor_core::{GenerationConfig, LanguageModel, Message, Result, SpeechToText};

/// How long to wait between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base * 2^attempt`, attempt counted from 1
    Exponential,
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            backoff: Backoff::Exponential,
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: delay,
            backoff: Backoff::Fixed,
        }
    }

    pub fn for_generation(config: &RetryConfig) -> Self {
        Self::exponential(
            config.generation_attempts,
            Duration::from_millis(config.generation_backoff_base_ms),
        )
    }

    pub fn for_transcription(config: &RetryConfig) -> Self {
        Self::fixed(
            config.transcription_attempts,
            Duration::from_millis(config.transcription_delay_ms),
        )
    }

    /// Delay after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Exponential => self.base_delay * 2u32.saturating_pow(attempt),
            Backoff::Fixed => self.base_delay,
        }
    }

    /// Run `op` until it succeeds, fails with a non-rate-limit error, or
    /// attempts run out
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_rate_limited() && attempt < self.max_attempts => {
                    let delay = self.delay_after(attempt);
                    tracing::warn!(
                        provider = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Rate limited, retrying"
                    );
                    metrics::counter!("advisor_provider_retries_total", "provider" => label.to_string())
                        .increment(1);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::warn!(provider = label, attempt, error = %e, "Provider call failed");
                    return Err(e);
                }
            }
        }
    }
}

/// Language model with rate-limit retry
pub struct RetryingModel {
    inner: Arc<dyn LanguageModel>,
    policy: RetryPolicy,
}

impl RetryingModel {
    pub fn new(inner: Arc<dyn LanguageModel>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl LanguageModel for RetryingModel {
    async fn generate(&self, messages: &[Message], config: &GenerationConfig) -> Result<String> {
        let inner = &self.inner;
        self.policy
            .run(inner.provider_name(), || inner.generate(messages, config))
            .await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }

    async fn is_available(&self) -> bool {
        self.inner.is_available().await
    }
}

/// Speech-to-text with rate-limit retry
pub struct RetryingTranscriber {
    inner: Arc<dyn SpeechToText>,
    policy: RetryPolicy,
}

impl RetryingTranscriber {
    pub fn new(inner: Arc<dyn SpeechToText>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl SpeechToText for RetryingTranscriber {
    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> Result<String> {
        let inner = &self.inner;
        self.policy
            .run(inner.service_name(), || inner.transcribe(audio, mime_type))
            .await
    }

    fn service_name(&self) -> &str {
        self.inner.service_name()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
