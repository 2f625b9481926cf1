//! Whisper-style speech-to-text over an OpenAI-compatible
//! `/audio/transcriptions` endpoint.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;

use advisor_core::{Error, Result, SpeechToText};

use crate::LlmError;

#[derive(Debug, Clone)]
pub struct TranscriberConfig {
    pub service: String,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    /// ISO-639-1 hint passed to the service
    pub language: Option<String>,
    pub timeout: Duration,
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            service: "groq".to_string(),
            endpoint: advisor_config::constants::endpoints::GROQ_DEFAULT.to_string(),
            api_key: None,
            model: advisor_config::constants::models::TRANSCRIPTION.to_string(),
            language: Some("en".to_string()),
            timeout: Duration::from_millis(advisor_config::constants::timeouts::STT_REQUEST_MS),
        }
    }
}

pub struct WhisperTranscriber {
    config: TranscriberConfig,
    client: Client,
}

impl WhisperTranscriber {
    pub fn new(config: TranscriberConfig) -> std::result::Result<Self, LlmError> {
        if config.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(LlmError::Configuration(format!(
                "API key required for transcription service {}",
                config.service
            )));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn transcription_url(&self) -> String {
        format!(
            "{}/audio/transcriptions",
            self.config.endpoint.trim_end_matches('/')
        )
    }

    async fn execute(&self, audio: &[u8], mime_type: &str) -> std::result::Result<String, LlmError> {
        let part = Part::bytes(audio.to_vec())
            .file_name(format!("audio.{}", extension_for(mime_type)))
            .mime_str(mime_type)
            .map_err(|e| LlmError::Configuration(format!("Invalid mime type {}: {}", mime_type, e)))?;

        let mut form = Form::new()
            .part("file", part)
            .text("model", self.config.model.clone())
            .text("response_format", "json");
        if let Some(ref language) = self.config.language {
            form = form.text("language", language.clone());
        }

        let mut request = self.client.post(self.transcription_url()).multipart(form);
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 || body.to_lowercase().contains("rate limit") {
                return Err(LlmError::RateLimited(format!("HTTP {}: {}", status, body)));
            }
            return Err(LlmError::Api(format!("HTTP {}: {}", status, body)));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        Ok(parsed.text.trim().to_string())
    }
}

/// File extension the service uses to sniff the container format
fn extension_for(mime_type: &str) -> &'static str {
    let base = mime_type.split(';').next().unwrap_or(mime_type).trim();
    match base {
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "m4a",
        "audio/ogg" => "ogg",
        "audio/flac" => "flac",
        _ => "webm",
    }
}

#[async_trait]
impl SpeechToText for WhisperTranscriber {
    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> Result<String> {
        if audio.is_empty() {
            return Err(Error::TranscriptionFailed("empty audio payload".to_string()));
        }

        let start = Instant::now();
        match self.execute(audio, mime_type).await {
            Ok(text) if text.is_empty() => {
                Err(Error::TranscriptionFailed("empty transcript".to_string()))
            }
            Ok(text) => {
                tracing::debug!(
                    service = %self.config.service,
                    chars = text.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Transcription received"
                );
                Ok(text)
            }
            Err(LlmError::RateLimited(msg)) => Err(Error::rate_limited(&self.config.service, msg)),
            Err(e) => Err(Error::TranscriptionFailed(e.to_string())),
        }
    }

    fn service_name(&self) -> &str {
        &self.config.service
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}
