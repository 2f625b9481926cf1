//! Error taxonomy shared by every crate in the workspace.

use thiserror::Error;

/// Pipeline errors
///
/// Each stage maps its local failures onto one of these variants. Only
/// `GenerationExhausted` is allowed to change what the user sees, and even
/// then the caller replaces it with an apology rather than surfacing it.
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Provider {provider} rate limited: {message}")]
    ProviderRateLimited { provider: String, message: String },

    #[error("Provider {provider} unavailable: {message}")]
    ProviderUnavailable { provider: String, message: String },

    #[error("Retrieval store unavailable: {0}")]
    RetrievalStoreUnavailable(String),

    #[error("Planning failed: {0}")]
    PlanningFailed(String),

    #[error("All generation providers failed ({attempted} tried): {last_error}")]
    GenerationExhausted { attempted: usize, last_error: String },

    #[error("Synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("History store error: {0}")]
    History(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn rate_limited(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ProviderRateLimited {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn unavailable(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ProviderUnavailable {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// True for the one error class that is retried with backoff.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::ProviderRateLimited { .. })
    }

    /// Short stable label, used as a metrics tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::ProviderRateLimited { .. } => "rate_limited",
            Error::ProviderUnavailable { .. } => "unavailable",
            Error::RetrievalStoreUnavailable(_) => "retrieval",
            Error::PlanningFailed(_) => "planning",
            Error::GenerationExhausted { .. } => "generation_exhausted",
            Error::SynthesisFailed(_) => "synthesis",
            Error::TranscriptionFailed(_) => "transcription",
            Error::History(_) => "history",
            Error::Config(_) => "config",
            Error::Internal(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_is_distinguishable() {
        assert!(Error::rate_limited("groq", "429").is_rate_limited());
        assert!(!Error::unavailable("groq", "connection refused").is_rate_limited());
        assert!(!Error::Internal("boom".into()).is_rate_limited());
    }

    #[test]
    fn test_display_includes_provider() {
        let err = Error::unavailable("openai", "timeout");
        assert_eq!(err.to_string(), "Provider openai unavailable: timeout");
        assert_eq!(err.kind(), "unavailable");
    }
}
