//! Wire form of pipeline events
//!
//! Shared by the SSE and WebSocket endpoints. Audio travels base64 encoded.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

use advisor_core::PipelineEvent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventMessage {
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
        data: String,
        mime_type: String,
        voice_id: String,
    },
    FallbackRequested {
        stage: String,
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
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

impl From<PipelineEvent> for EventMessage {
    fn from(event: PipelineEvent) -> Self {
        match event {
            PipelineEvent::Started { session_id } => EventMessage::Started { session_id },
            PipelineEvent::Transcription {
                text,
                low_confidence,
            } => EventMessage::Transcription {
                text,
                low_confidence,
            },
            PipelineEvent::Chunk { index, text } => EventMessage::Chunk { index, text },
            PipelineEvent::AudioReady {
                audio,
                mime_type,
                voice_id,
            } => EventMessage::AudioReady {
                data: BASE64.encode(audio),
                mime_type,
                voice_id,
            },
            PipelineEvent::FallbackRequested {
                stage,
                reason,
                speech_text,
            } => EventMessage::FallbackRequested {
                stage: stage.as_str().to_string(),
                reason,
                speech_text,
            },
            PipelineEvent::Complete {
                text,
                instance_id,
                title,
            } => EventMessage::Complete {
                text,
                instance_id,
                title,
            },
            PipelineEvent::Failed { message } => EventMessage::Failed { message },
        }
    }
}

impl EventMessage {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to serialize event");
            r#"{"type":"failed","message":"serialization error"}"#.to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use advisor_core::PipelineStage;

    #[test]
    fn test_audio_is_base64_encoded() {
        let message = EventMessage::from(PipelineEvent::AudioReady {
            audio: b"mp3".to_vec(),
            mime_type: "audio/mpeg".into(),
            voice_id: "aura-asteria-en".into(),
        });
        let json: serde_json::Value = serde_json::from_str(&message.to_json()).unwrap();
        assert_eq!(json["type"], "audio_ready");
        assert_eq!(json["data"], "bXAz");
    }

    #[test]
    fn test_fallback_names_stage() {
        let message = EventMessage::from(PipelineEvent::FallbackRequested {
            stage: PipelineStage::Synthesis,
            reason: "tts down".into(),
            speech_text: None,
        });
        let json: serde_json::Value = serde_json::from_str(&message.to_json()).unwrap();
        assert_eq!(json["type"], "fallback_requested");
        assert_eq!(json["stage"], PipelineStage::Synthesis.as_str());
        assert!(json.get("speech_text").is_none());
    }
}
