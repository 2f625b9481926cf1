//! Speech processing traits

use async_trait::async_trait;

use crate::Result;

/// Speech-to-Text interface
#[async_trait]
pub trait SpeechToText: Send + Sync + 'static {
    /// Transcribe one complete recording
    ///
    /// # Arguments
    /// * `audio` - Encoded audio bytes as received from the client
    /// * `mime_type` - e.g. `audio/webm`, `audio/wav`
    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> Result<String>;

    fn service_name(&self) -> &str;

    fn model_name(&self) -> &str;
}

/// Synthesized audio payload
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Text-to-Speech interface
#[async_trait]
pub trait TextToSpeech: Send + Sync + 'static {
    /// Synthesize plain text (markdown already stripped) with the given voice
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<SynthesizedAudio>;

    fn service_name(&self) -> &str;

    fn model_name(&self) -> &str;
}
