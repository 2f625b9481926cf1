//! Language model trait

use async_trait::async_trait;

use crate::{GenerationConfig, Message, Result};

/// Chat-completion capability.
///
/// Implementations must return `Error::ProviderRateLimited` for throttling so
/// callers can back off, and `Error::ProviderUnavailable` for everything else.
#[async_trait]
pub trait LanguageModel: Send + Sync + 'static {
    async fn generate(&self, messages: &[Message], config: &GenerationConfig) -> Result<String>;

    /// Model identifier for logging and tracking
    fn model_name(&self) -> &str;

    /// Provider identifier (e.g. "groq", "openai")
    fn provider_name(&self) -> &str;

    async fn is_available(&self) -> bool {
        true
    }
}
