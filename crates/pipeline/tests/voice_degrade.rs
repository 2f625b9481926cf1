//! Every backend down: the voice session still completes with text.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;

use advisor_agent::{PostProcessor, Responder};
use advisor_config::constants::{messages, voice};
use advisor_config::PostProcessConfig;
use advisor_core::{
    Error, GenerationConfig, LanguageModel, Message, PipelineEvent, PipelineStage, Result,
    RetrievalResult, Retriever, SpeechToText, StageStatus, SynthesizedAudio, TextToSpeech,
};
use advisor_llm::ProviderChain;
use advisor_pipeline::{PipelineTracker, VoiceOrchestrator, VoiceRequest};

struct DownLlm(&'static str);

#[async_trait]
impl LanguageModel for DownLlm {
    async fn generate(&self, _messages: &[Message], _config: &GenerationConfig) -> Result<String> {
        Err(Error::unavailable(self.0, "connection refused"))
    }

    fn model_name(&self) -> &str {
        "down"
    }

    fn provider_name(&self) -> &str {
        self.0
    }
}

struct DownStt;

#[async_trait]
impl SpeechToText for DownStt {
    async fn transcribe(&self, _audio: &[u8], _mime_type: &str) -> Result<String> {
        Err(Error::TranscriptionFailed("service unavailable".into()))
    }

    fn service_name(&self) -> &str {
        "down-stt"
    }

    fn model_name(&self) -> &str {
        "down"
    }
}

struct DownTts;

#[async_trait]
impl TextToSpeech for DownTts {
    async fn synthesize(&self, _text: &str, _voice_id: &str) -> Result<SynthesizedAudio> {
        Err(Error::SynthesisFailed("service unavailable".into()))
    }

    fn service_name(&self) -> &str {
        "down-tts"
    }

    fn model_name(&self) -> &str {
        "down"
    }
}

struct EmptyRetriever;

#[async_trait]
impl Retriever for EmptyRetriever {
    async fn retrieve(&self, _query: &str, _min: usize, _max: usize) -> RetrievalResult {
        RetrievalResult::default()
    }
}

fn orchestrator() -> VoiceOrchestrator {
    let chain = ProviderChain::new(Arc::new(DownLlm("fast")))
        .with_fallback(Arc::new(DownLlm("quality")));
    let post = PostProcessor::new(&PostProcessConfig::default()).unwrap();
    let responder = Responder::new(chain, Arc::new(EmptyRetriever), post);

    VoiceOrchestrator::new(
        Arc::new(responder),
        Arc::new(PipelineTracker::new(Arc::new(DashMap::new()))),
    )
    .with_stt(Arc::new(DownStt))
    .with_tts(Arc::new(DownTts))
}

fn request(session_id: &str) -> VoiceRequest {
    VoiceRequest {
        session_id: Some(session_id.to_string()),
        user_id: "owner-1".into(),
        instance_id: None,
        pipeline_id: "voice-chat".into(),
        audio: vec![0u8; 64],
        mime_type: "audio/webm".into(),
        accent: None,
        gender: None,
    }
}

#[tokio::test]
async fn test_full_degrade_still_answers() {
    let orchestrator = orchestrator();
    let outcome = orchestrator.run(request("degrade-1")).await;

    assert!(outcome.low_confidence);
    assert_eq!(outcome.transcript, voice::TRANSCRIPTION_PLACEHOLDER);
    assert_eq!(outcome.text, messages::GENERATION_APOLOGY);
    assert!(outcome.audio.is_none());
    assert!(!outcome.speech_text.unwrap().is_empty());
    assert_eq!(outcome.voice_id, voice::DEFAULT_VOICE);

    let summary = outcome.summary.unwrap();
    for stage in PipelineStage::ALL {
        let status = summary.status(stage).unwrap();
        assert!(
            matches!(status, StageStatus::Fallback | StageStatus::Failed),
            "{} ended {:?}",
            stage,
            status
        );
    }
    assert_eq!(summary.fallbacks.len(), 3);
    assert!(orchestrator.tracker().is_empty());
}

#[tokio::test]
async fn test_full_degrade_stream_ends_complete() {
    let orchestrator = Arc::new(orchestrator());
    let events: Vec<PipelineEvent> = orchestrator.run_stream(request("degrade-2")).collect().await;

    let fallback_stages: Vec<PipelineStage> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::FallbackRequested { stage, .. } => Some(*stage),
            _ => None,
        })
        .collect();
    assert_eq!(fallback_stages, PipelineStage::ALL.to_vec());

    match events.last() {
        Some(PipelineEvent::Complete { text, .. }) => assert!(!text.is_empty()),
        other => panic!("expected Complete, got {:?}", other),
    }
    assert!(!events
        .iter()
        .any(|e| matches!(e, PipelineEvent::Failed { .. })));
}
