//! Application State
//!
//! Shared state across all handlers.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use advisor_agent::Responder;
use advisor_config::Settings;
use advisor_core::{AnswerGenerator, Embedder, InstructionStore};
use advisor_llm::LlmFactory;
use advisor_persistence::InMemoryChatHistory;
use advisor_pipeline::{
    HttpTtsBackend, PipelineTracker, SessionRegistry, VoiceConfig, VoiceOrchestrator,
};
use advisor_rag::{
    CascadeConfig, CascadeRetriever, EmbeddingConfig, HttpEmbedder, HttpEmbeddingConfig,
    InMemoryInstructionStore, KnowledgeLoader, SimpleEmbedder,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub responder: Arc<Responder>,
    pub voice: Arc<VoiceOrchestrator>,
    /// Instructions loaded at startup
    pub knowledge_count: usize,
}

impl AppState {
    pub fn new(config: Settings, responder: Arc<Responder>, voice: Arc<VoiceOrchestrator>) -> Self {
        Self {
            config: Arc::new(config),
            responder,
            voice,
            knowledge_count: 0,
        }
    }

    pub fn with_knowledge_count(mut self, count: usize) -> Self {
        self.knowledge_count = count;
        self
    }

    pub fn tracker(&self) -> &Arc<PipelineTracker> {
        self.voice.tracker()
    }

    /// Wire every backend from settings. Optional services that cannot be
    /// created are logged and left out; the pipeline degrades around them.
    pub async fn build(config: Settings) -> anyhow::Result<Self> {
        let chain = LlmFactory::create_chain(&config.providers);

        let embedder: Arc<dyn Embedder> = match config.providers.embedding.kind.as_str() {
            "http" => Arc::new(
                HttpEmbedder::new(HttpEmbeddingConfig::from(&config.providers.embedding))
                    .context("Failed to create embedding client")?,
            ),
            _ => Arc::new(SimpleEmbedder::new(EmbeddingConfig {
                embedding_dim: config.providers.embedding.dimension,
                normalize: true,
            })),
        };

        let store = Arc::new(InMemoryInstructionStore::new());
        let knowledge_count = KnowledgeLoader::load_directory(
            Path::new(&config.rag.knowledge_path),
            &store,
            embedder.as_ref(),
        )
        .await
        .context("Failed to load instruction knowledge")?;
        tracing::info!(
            path = %config.rag.knowledge_path,
            instructions = knowledge_count,
            "Instruction knowledge loaded"
        );

        let store: Arc<dyn InstructionStore> = store;
        let retriever = Arc::new(CascadeRetriever::new(
            store,
            embedder,
            CascadeConfig::from(&config.rag),
        ));

        let history = Arc::new(InMemoryChatHistory::new(config.history.max_turns));
        let responder = Arc::new(
            Responder::from_settings(&config, chain, retriever)
                .context("Failed to configure responder")?
                .with_history(history),
        );

        let tracker = Arc::new(PipelineTracker::from_settings(
            &config.voice,
            SessionRegistry::default(),
        ));
        let answers: Arc<dyn AnswerGenerator> = responder.clone();
        let mut voice = VoiceOrchestrator::new(answers, tracker)
            .with_config(VoiceConfig::from(&config.voice));

        match LlmFactory::create_transcriber(&config.providers.stt, &config.providers.retry) {
            Ok(Some(stt)) => voice = voice.with_stt(stt),
            Ok(None) => tracing::info!("Transcription disabled"),
            Err(e) => tracing::warn!(error = %e, "Transcription unavailable"),
        }
        match HttpTtsBackend::from_settings(&config.providers.tts) {
            Ok(Some(tts)) => voice = voice.with_tts(Arc::new(tts)),
            Ok(None) => tracing::info!("Synthesis disabled"),
            Err(e) => tracing::warn!(error = %e, "Synthesis unavailable"),
        }

        Ok(Self::new(config, responder, Arc::new(voice)).with_knowledge_count(knowledge_count))
    }
}
