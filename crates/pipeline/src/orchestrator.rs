//! Voice Pipeline Orchestrator
//!
//! Runs one spoken exchange as three strictly ordered stages:
//!
//! ```text
//! audio -> Transcription -> Generation -> Synthesis -> Complete
//!            | failure        | failure      | failure
//!            v                v              v
//!        placeholder       apology       client speech
//!        (low confidence)  (fallback)    (cleaned text)
//! ```
//!
//! No stage failure escapes: every stage degrades to a usable result and the
//! session always ends with `Complete`. The only early exit is a streaming
//! consumer that went away, which fails the session in the tracker.

use std::sync::Arc;

use futures::stream::BoxStream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::Instrument;

use advisor_config::constants::{messages, voice};
use advisor_config::VoiceSettings;
use advisor_core::{
    AnswerGenerator, AnswerRequest, PipelineEvent, PipelineStage, SpeechToText, StageStatus,
    Surface, SynthesizedAudio, TextToSpeech,
};

use crate::speech::{strip_markdown_for_speech, voice_for};
use crate::tracker::{PipelineSummary, PipelineTracker};

/// Service name recorded for a stage with no backend configured
const UNCONFIGURED: &str = "none";

#[derive(Debug, Clone)]
pub struct VoiceConfig {
    pub speech_char_limit: usize,
    pub default_accent: String,
    pub default_gender: String,
    pub placeholder_transcript: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            speech_char_limit: voice::SPEECH_CHAR_LIMIT,
            default_accent: voice::DEFAULT_ACCENT.to_string(),
            default_gender: voice::DEFAULT_GENDER.to_string(),
            placeholder_transcript: voice::TRANSCRIPTION_PLACEHOLDER.to_string(),
        }
    }
}

impl From<&VoiceSettings> for VoiceConfig {
    fn from(settings: &VoiceSettings) -> Self {
        Self {
            speech_char_limit: settings.speech_char_limit,
            default_accent: settings.default_accent.clone(),
            default_gender: settings.default_gender.clone(),
            ..Default::default()
        }
    }
}

/// One recorded utterance
#[derive(Debug, Clone)]
pub struct VoiceRequest {
    /// Generated when absent
    pub session_id: Option<String>,
    pub user_id: String,
    pub instance_id: Option<String>,
    pub pipeline_id: String,
    pub audio: Vec<u8>,
    pub mime_type: String,
    pub accent: Option<String>,
    pub gender: Option<String>,
}

/// Everything a non-streaming caller needs after a session
#[derive(Debug, Clone)]
pub struct VoiceOutcome {
    pub session_id: String,
    pub transcript: String,
    pub low_confidence: bool,
    pub text: String,
    pub instance_id: Option<String>,
    pub title: Option<String>,
    pub audio: Option<SynthesizedAudio>,
    pub voice_id: String,
    /// Set when the client has to speak `text` itself
    pub speech_text: Option<String>,
    pub summary: Option<PipelineSummary>,
}

/// Event sink. Without a channel events are dropped, as in `run`.
struct Emitter(Option<mpsc::UnboundedSender<PipelineEvent>>);

impl Emitter {
    fn send(&self, event: PipelineEvent) {
        if let Some(tx) = &self.0 {
            let _ = tx.send(event);
        }
    }

    fn is_closed(&self) -> bool {
        self.0.as_ref().map_or(false, |tx| tx.is_closed())
    }
}

pub struct VoiceOrchestrator {
    stt: Option<Arc<dyn SpeechToText>>,
    answers: Arc<dyn AnswerGenerator>,
    tts: Option<Arc<dyn TextToSpeech>>,
    tracker: Arc<PipelineTracker>,
    config: VoiceConfig,
}

impl VoiceOrchestrator {
    pub fn new(answers: Arc<dyn AnswerGenerator>, tracker: Arc<PipelineTracker>) -> Self {
        Self {
            stt: None,
            answers,
            tts: None,
            tracker,
            config: VoiceConfig::default(),
        }
    }

    pub fn with_stt(mut self, stt: Arc<dyn SpeechToText>) -> Self {
        self.stt = Some(stt);
        self
    }

    pub fn with_tts(mut self, tts: Arc<dyn TextToSpeech>) -> Self {
        self.tts = Some(tts);
        self
    }

    pub fn with_config(mut self, config: VoiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn tracker(&self) -> &Arc<PipelineTracker> {
        &self.tracker
    }

    /// Run a session to completion
    pub async fn run(&self, request: VoiceRequest) -> VoiceOutcome {
        self.execute(request, &Emitter(None)).await
    }

    /// Run a session on its own task, yielding events until `Complete`
    pub fn run_stream(self: Arc<Self>, request: VoiceRequest) -> BoxStream<'static, PipelineEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            self.execute(request, &Emitter(Some(tx))).await;
        });
        Box::pin(UnboundedReceiverStream::new(rx))
    }

    async fn execute(&self, request: VoiceRequest, events: &Emitter) -> VoiceOutcome {
        let session_id = request
            .session_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let span = tracing::info_span!(
            "voice_session",
            session_id = %session_id,
            user = %request.user_id,
        );
        self.execute_inner(session_id, request, events)
            .instrument(span)
            .await
    }

    async fn execute_inner(
        &self,
        session_id: String,
        request: VoiceRequest,
        events: &Emitter,
    ) -> VoiceOutcome {
        // A clashing id only loses telemetry; the session still runs
        if let Err(e) = self.tracker.create(&session_id, Some(&request.user_id)) {
            tracing::warn!(error = %e, "Session not tracked");
        }
        events.send(PipelineEvent::Started {
            session_id: session_id.clone(),
        });

        let accent = request
            .accent
            .clone()
            .unwrap_or_else(|| self.config.default_accent.clone());
        let gender = request
            .gender
            .clone()
            .unwrap_or_else(|| self.config.default_gender.clone());
        let voice_id = voice_for(&accent, &gender).to_string();

        let mut outcome = VoiceOutcome {
            session_id: session_id.clone(),
            transcript: String::new(),
            low_confidence: false,
            text: String::new(),
            instance_id: request.instance_id.clone(),
            title: None,
            audio: None,
            voice_id: voice_id.clone(),
            speech_text: None,
            summary: None,
        };

        // Transcription
        let (transcript, low_confidence) = self.transcribe(&session_id, &request, events).await;
        events.send(PipelineEvent::Transcription {
            text: transcript.clone(),
            low_confidence,
        });
        outcome.transcript = transcript.clone();
        outcome.low_confidence = low_confidence;
        if self.abandoned(&session_id, events, &mut outcome) {
            return outcome;
        }

        // Generation
        self.generate(&session_id, &request, transcript, events, &mut outcome)
            .await;
        events.send(PipelineEvent::Chunk {
            index: 0,
            text: outcome.text.clone(),
        });
        if self.abandoned(&session_id, events, &mut outcome) {
            return outcome;
        }

        // Synthesis
        self.synthesize(&session_id, &voice_id, events, &mut outcome)
            .await;

        outcome.summary = match self.tracker.complete(&session_id) {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::warn!(error = %e, "No summary for session");
                None
            }
        };
        events.send(PipelineEvent::Complete {
            text: outcome.text.clone(),
            instance_id: outcome.instance_id.clone(),
            title: outcome.title.clone(),
        });
        outcome
    }

    /// Stop early when the streaming consumer is gone
    fn abandoned(&self, session_id: &str, events: &Emitter, outcome: &mut VoiceOutcome) -> bool {
        if !events.is_closed() {
            return false;
        }
        outcome.summary = self.tracker.fail(session_id, "client disconnected").ok();
        true
    }

    fn start(&self, session_id: &str, stage: PipelineStage, service: &str, model: &str) {
        if let Err(e) = self.tracker.start_stage(session_id, stage, service, model) {
            tracing::warn!(error = %e, "Stage start not tracked");
        }
    }

    fn finish(&self, session_id: &str, stage: PipelineStage, status: StageStatus, error: Option<String>) {
        if let Err(e) = self.tracker.finish_stage(session_id, stage, status, error) {
            tracing::warn!(error = %e, "Stage finish not tracked");
        }
    }

    async fn transcribe(
        &self,
        session_id: &str,
        request: &VoiceRequest,
        events: &Emitter,
    ) -> (String, bool) {
        let stage = PipelineStage::Transcription;
        let result = match &self.stt {
            Some(stt) => {
                self.start(session_id, stage, stt.service_name(), stt.model_name());
                stt.transcribe(&request.audio, &request.mime_type)
                    .await
                    .map_err(|e| e.to_string())
            }
            None => {
                self.start(session_id, stage, UNCONFIGURED, UNCONFIGURED);
                Err("no transcription service configured".to_string())
            }
        };

        match result {
            Ok(text) => {
                self.finish(session_id, stage, StageStatus::Success, None);
                tracing::info!(chars = text.len(), "Audio transcribed");
                (text, false)
            }
            Err(reason) => {
                tracing::warn!(error = %reason, "Transcription failed, using placeholder");
                self.finish(session_id, stage, StageStatus::Fallback, Some(reason.clone()));
                events.send(PipelineEvent::FallbackRequested {
                    stage,
                    reason,
                    speech_text: None,
                });
                (self.config.placeholder_transcript.clone(), true)
            }
        }
    }

    async fn generate(
        &self,
        session_id: &str,
        request: &VoiceRequest,
        query: String,
        events: &Emitter,
        outcome: &mut VoiceOutcome,
    ) {
        let stage = PipelineStage::Generation;
        self.start(session_id, stage, "answer", &request.pipeline_id);

        let answer_request = AnswerRequest {
            query,
            user_id: request.user_id.clone(),
            instance_id: request.instance_id.clone(),
            pipeline_id: request.pipeline_id.clone(),
            surface: Surface::Voice,
        };

        match self.answers.generate_answer(answer_request).await {
            Ok(answer) if answer.fallback => {
                let reason = "all generation providers failed".to_string();
                self.finish(session_id, stage, StageStatus::Fallback, Some(reason.clone()));
                events.send(PipelineEvent::FallbackRequested {
                    stage,
                    reason,
                    speech_text: None,
                });
                outcome.text = answer.text;
                outcome.instance_id = answer.instance_id;
                outcome.title = answer.title;
            }
            Ok(answer) => {
                self.finish(session_id, stage, StageStatus::Success, None);
                tracing::info!(provider = %answer.provider, model = %answer.model, "Answer generated");
                outcome.text = answer.text;
                outcome.instance_id = answer.instance_id;
                outcome.title = answer.title;
            }
            Err(e) => {
                tracing::error!(error = %e, "Answer generation failed, using apology");
                metrics::counter!("advisor_generation_exhausted_total").increment(1);
                self.finish(session_id, stage, StageStatus::Failed, Some(e.to_string()));
                events.send(PipelineEvent::FallbackRequested {
                    stage,
                    reason: e.to_string(),
                    speech_text: None,
                });
                outcome.text = messages::GENERATION_APOLOGY.to_string();
            }
        }
    }

    async fn synthesize(
        &self,
        session_id: &str,
        voice_id: &str,
        events: &Emitter,
        outcome: &mut VoiceOutcome,
    ) {
        let stage = PipelineStage::Synthesis;
        let spoken = strip_markdown_for_speech(&outcome.text, self.config.speech_char_limit);

        let result = match &self.tts {
            Some(tts) => {
                self.start(session_id, stage, tts.service_name(), voice_id);
                tts.synthesize(&spoken, voice_id)
                    .await
                    .map_err(|e| e.to_string())
            }
            None => {
                self.start(session_id, stage, UNCONFIGURED, voice_id);
                Err("no synthesis service configured".to_string())
            }
        };

        match result {
            Ok(audio) => {
                self.finish(session_id, stage, StageStatus::Success, None);
                events.send(PipelineEvent::AudioReady {
                    audio: audio.bytes.clone(),
                    mime_type: audio.mime_type.clone(),
                    voice_id: voice_id.to_string(),
                });
                outcome.audio = Some(audio);
            }
            Err(reason) => {
                tracing::warn!(error = %reason, "Synthesis failed, client will speak the text");
                self.finish(session_id, stage, StageStatus::Fallback, Some(reason.clone()));
                events.send(PipelineEvent::FallbackRequested {
                    stage,
                    reason,
                    speech_text: Some(spoken.clone()),
                });
                outcome.speech_text = Some(spoken);
            }
        }
    }
}
