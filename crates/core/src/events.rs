//! Pipeline stages and the closed set of streaming events.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One tracked phase of a voice session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Transcription,
    Generation,
    Synthesis,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 3] = [
        PipelineStage::Transcription,
        PipelineStage::Generation,
        PipelineStage::Synthesis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Transcription => "transcription",
            PipelineStage::Generation => "generation",
            PipelineStage::Synthesis => "synthesis",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-stage status. Moves forward only: pending, running, then one terminal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Running,
    Success,
    Fallback,
    Failed,
}

impl StageStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StageStatus::Success | StageStatus::Fallback | StageStatus::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Success => "success",
            StageStatus::Fallback => "fallback",
            StageStatus::Failed => "failed",
        }
    }
}

/// Ordered events emitted by streaming responses and voice sessions.
///
/// Consumers read until a terminal variant (`Complete` or `Failed`).
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Started {
        session_id: String,
    },
    Transcription {
        text: String,
        low_confidence: bool,
    },
    Chunk {
        index: usize,
        text: String,
    },
    AudioReady {
        audio: Vec<u8>,
        mime_type: String,
        voice_id: String,
    },
    FallbackRequested {
        stage: PipelineStage,
        reason: String,
        /// Cleaned text for client-side speech when synthesis failed
        speech_text: Option<String>,
    },
    Complete {
        text: String,
        instance_id: Option<String>,
        title: Option<String>,
    },
    Failed {
        message: String,
    },
}

impl PipelineEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineEvent::Complete { .. } | PipelineEvent::Failed { .. }
        )
    }

    /// Wire name of the variant.
    pub fn name(&self) -> &'static str {
        match self {
            PipelineEvent::Started { .. } => "started",
            PipelineEvent::Transcription { .. } => "transcription",
            PipelineEvent::Chunk { .. } => "chunk",
            PipelineEvent::AudioReady { .. } => "audio_ready",
            PipelineEvent::FallbackRequested { .. } => "fallback_requested",
            PipelineEvent::Complete { .. } => "complete",
            PipelineEvent::Failed { .. } => "failed",
        }
    }
}
