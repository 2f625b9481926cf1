//! Voice pipeline
//!
//! This crate sequences one spoken exchange:
//! - Transcription with a low-confidence placeholder on failure
//! - Answer generation through any `AnswerGenerator`
//! - Synthesis with a client-side speech fallback
//! - Per-stage tracking, performance tiers and bottleneck reporting

pub mod orchestrator;
pub mod speech;
pub mod tracker;
pub mod tts;

pub use orchestrator::{VoiceConfig, VoiceOrchestrator, VoiceOutcome, VoiceRequest};
pub use speech::{strip_markdown_for_speech, voice_for};
pub use tracker::{
    ActiveSession, PerformanceTier, PipelineSession, PipelineSummary, PipelineTracker,
    SessionPhase, SessionRegistry, StageRecord, StageSummary, StageTargets, TierBounds,
};
pub use tts::{HttpTtsBackend, TtsConfig};

use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("Session already exists: {0}")]
    DuplicateSession(String),

    #[error("Invalid transition for {stage}: {from} -> {to}")]
    InvalidTransition {
        stage: String,
        from: String,
        to: String,
    },

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<PipelineError> for advisor_core::Error {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Tts(msg) => advisor_core::Error::SynthesisFailed(msg),
            PipelineError::Config(msg) => advisor_core::Error::Config(msg),
            other => advisor_core::Error::Internal(other.to_string()),
        }
    }
}
