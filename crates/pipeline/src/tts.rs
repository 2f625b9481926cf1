//! Text-to-speech over the Deepgram speak API
//!
//! `POST {endpoint}?model={voice}&encoding=mp3` with a JSON `{"text": ...}`
//! body; the response body is the encoded audio.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use advisor_config::constants::{endpoints, timeouts};
use advisor_config::TtsSettings;
use advisor_core::{Error, Result, SynthesizedAudio, TextToSpeech};

use crate::PipelineError;

#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub service: String,
    pub endpoint: String,
    pub api_key: Option<String>,
    /// Container requested from the service
    pub encoding: String,
    pub timeout: Duration,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            service: "deepgram".to_string(),
            endpoint: endpoints::DEEPGRAM_SPEAK_DEFAULT.to_string(),
            api_key: None,
            encoding: "mp3".to_string(),
            timeout: Duration::from_millis(timeouts::TTS_REQUEST_MS),
        }
    }
}

impl From<&TtsSettings> for TtsConfig {
    fn from(settings: &TtsSettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            api_key: settings
                .api_key
                .clone()
                .filter(|k| !k.is_empty())
                .or_else(|| std::env::var("DEEPGRAM_API_KEY").ok()),
            timeout: Duration::from_millis(settings.timeout_ms),
            ..Default::default()
        }
    }
}

#[derive(Serialize)]
struct SpeakRequest<'a> {
    text: &'a str,
}

pub struct HttpTtsBackend {
    config: TtsConfig,
    client: Client,
}

impl HttpTtsBackend {
    pub fn new(config: TtsConfig) -> std::result::Result<Self, PipelineError> {
        if config.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(PipelineError::Config(format!(
                "API key required for TTS service {}",
                config.service
            )));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PipelineError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Backend from settings, or `None` when synthesis is disabled
    pub fn from_settings(
        settings: &TtsSettings,
    ) -> std::result::Result<Option<Self>, PipelineError> {
        if !settings.enabled {
            return Ok(None);
        }
        Self::new(TtsConfig::from(settings)).map(Some)
    }

    fn mime_type(&self) -> &'static str {
        match self.config.encoding.as_str() {
            "wav" | "linear16" => "audio/wav",
            "opus" | "ogg" => "audio/ogg",
            "aac" => "audio/aac",
            "flac" => "audio/flac",
            _ => "audio/mpeg",
        }
    }

    async fn execute(&self, text: &str, voice_id: &str) -> std::result::Result<Vec<u8>, PipelineError> {
        let mut request = self
            .client
            .post(&self.config.endpoint)
            .query(&[("model", voice_id), ("encoding", self.config.encoding.as_str())])
            .json(&SpeakRequest { text });
        if let Some(ref key) = self.config.api_key {
            request = request.header("Authorization", format!("Token {}", key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| PipelineError::Tts(format!("Request failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Tts(format!("HTTP {}: {}", status, body)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PipelineError::Tts(format!("Failed to read audio: {}", e)))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl TextToSpeech for HttpTtsBackend {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<SynthesizedAudio> {
        if text.trim().is_empty() {
            return Err(Error::SynthesisFailed("nothing to speak".to_string()));
        }

        let start = Instant::now();
        let bytes = self.execute(text, voice_id).await?;
        if bytes.is_empty() {
            return Err(Error::SynthesisFailed("empty audio response".to_string()));
        }

        tracing::debug!(
            service = %self.config.service,
            voice = voice_id,
            bytes = bytes.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Speech synthesized"
        );

        Ok(SynthesizedAudio {
            bytes,
            mime_type: self.mime_type().to_string(),
        })
    }

    fn service_name(&self) -> &str {
        &self.config.service
    }

    fn model_name(&self) -> &str {
        "aura"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TtsConfig {
        TtsConfig {
            api_key: Some("dg_test".into()),
            endpoint: "http://127.0.0.1:9/v1/speak".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_requires_api_key() {
        assert!(matches!(
            HttpTtsBackend::new(TtsConfig::default()),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_disabled_settings_yield_none() {
        let settings = TtsSettings {
            enabled: false,
            ..Default::default()
        };
        assert!(HttpTtsBackend::from_settings(&settings).unwrap().is_none());
    }

    #[test]
    fn test_mime_type_follows_encoding() {
        let backend = HttpTtsBackend::new(config()).unwrap();
        assert_eq!(backend.mime_type(), "audio/mpeg");

        let wav = HttpTtsBackend::new(TtsConfig {
            encoding: "linear16".into(),
            ..config()
        })
        .unwrap();
        assert_eq!(wav.mime_type(), "audio/wav");
    }

    #[tokio::test]
    async fn test_blank_text_rejected_without_request() {
        let backend = HttpTtsBackend::new(config()).unwrap();
        let err = backend.synthesize("   ", "aura-asteria-en").await.unwrap_err();
        assert!(matches!(err, Error::SynthesisFailed(_)));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_synthesis_failure() {
        let backend = HttpTtsBackend::new(config()).unwrap();
        let err = backend
            .synthesize("Hello there.", "aura-asteria-en")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "synthesis");
    }
}
