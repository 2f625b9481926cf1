//! Text answer path
//!
//! ```text
//! query -> retrieval -> quality config -> plan -> provider chain
//!       -> truncation repair -> post-processing -> history + title -> Answer
//! ```
//!
//! Every stage degrades instead of failing. When the whole provider chain is
//! exhausted the answer is a fixed apology and `Answer::fallback` is set.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashSet;
use futures::stream::BoxStream;
use tracing::Instrument;

use advisor_config::constants::{history as history_defaults, messages, rag as rag_defaults};
use advisor_config::Settings;
use advisor_core::{
    Answer, AnswerGenerator, AnswerRequest, ChatHistoryStore, ChatTurn, GenerationConfig,
    PipelineEvent, ResponsePlan, Result, Retriever,
};
use advisor_llm::{PromptBuilder, ProviderChain, DEFAULT_SYSTEM_PROMPT};

use crate::optimizer::QualityOptimizer;
use crate::planner::{
    adjust_config, mark_continued, plan_system_prompt, structured_prompt, truncation_repair,
    ResponsePlanner, TruncationRepair,
};
use crate::post_process::{sentence_chunks, PostProcessor};
use crate::title::TitleGenerator;
use crate::AgentError;

/// Provider name reported when the apology was returned
pub const NO_PROVIDER: &str = "none";

/// Marks an instance as being titled; released on drop
struct TitleClaim<'a> {
    titling: &'a DashSet<String>,
    instance_id: String,
}

impl<'a> TitleClaim<'a> {
    fn acquire(titling: &'a DashSet<String>, instance_id: &str) -> Option<Self> {
        titling.insert(instance_id.to_string()).then(|| Self {
            titling,
            instance_id: instance_id.to_string(),
        })
    }
}

impl Drop for TitleClaim<'_> {
    fn drop(&mut self) {
        self.titling.remove(&self.instance_id);
    }
}

pub struct Responder {
    chain: ProviderChain,
    retriever: Arc<dyn Retriever>,
    planner: ResponsePlanner,
    optimizer: QualityOptimizer,
    post_processor: PostProcessor,
    titles: TitleGenerator,
    history: Option<Arc<dyn ChatHistoryStore>>,
    /// Instances with a title request in flight
    titling: DashSet<String>,
    target_min: usize,
    target_max: usize,
    context_turns: usize,
}

impl Responder {
    /// Responder with default shaping. The planner and title generator use
    /// the chain's primary provider.
    pub fn new(
        chain: ProviderChain,
        retriever: Arc<dyn Retriever>,
        post_processor: PostProcessor,
    ) -> Self {
        let planner = match chain.primary() {
            Some(model) => ResponsePlanner::new(model.clone(), Default::default()),
            None => ResponsePlanner::disabled(Default::default()),
        };
        let titles = match chain.primary() {
            Some(model) => TitleGenerator::new(model.clone()),
            None => TitleGenerator::heuristic(),
        };
        Self {
            chain,
            retriever,
            planner,
            optimizer: QualityOptimizer::default(),
            post_processor,
            titles,
            history: None,
            titling: DashSet::new(),
            target_min: rag_defaults::TARGET_MIN,
            target_max: rag_defaults::TARGET_MAX,
            context_turns: history_defaults::CONTEXT_TURNS,
        }
    }

    /// Responder shaped by the loaded settings
    pub fn from_settings(
        settings: &Settings,
        chain: ProviderChain,
        retriever: Arc<dyn Retriever>,
    ) -> std::result::Result<Self, AgentError> {
        let post_processor = PostProcessor::new(&settings.post_process)?;
        let planner = match chain.primary() {
            Some(model) => ResponsePlanner::new(model.clone(), settings.planner.clone()),
            None => ResponsePlanner::disabled(settings.planner.clone()),
        };
        let titles = match chain.primary() {
            Some(model) => TitleGenerator::new(model.clone()),
            None => TitleGenerator::heuristic(),
        }
        .with_max_words(settings.history.title_max_words);

        Ok(Self::new(chain, retriever, post_processor)
            .with_planner(planner)
            .with_titles(titles)
            .with_optimizer(QualityOptimizer::new(
                settings.voice.token_cap,
                settings.post_process.links.clone(),
            ))
            .with_retrieval_targets(settings.rag.target_min, settings.rag.target_max)
            .with_context_turns(settings.history.context_turns))
    }

    pub fn with_history(mut self, history: Arc<dyn ChatHistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_planner(mut self, planner: ResponsePlanner) -> Self {
        self.planner = planner;
        self
    }

    pub fn with_titles(mut self, titles: TitleGenerator) -> Self {
        self.titles = titles;
        self
    }

    pub fn with_optimizer(mut self, optimizer: QualityOptimizer) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn with_retrieval_targets(mut self, target_min: usize, target_max: usize) -> Self {
        self.target_min = target_min.min(target_max);
        self.target_max = target_max;
        self
    }

    pub fn with_context_turns(mut self, turns: usize) -> Self {
        self.context_turns = turns;
        self
    }

    pub fn optimizer(&self) -> &QualityOptimizer {
        &self.optimizer
    }

    /// Answer one query. Only history failures are swallowed here; the
    /// generation stage turns its own failure into the apology.
    pub async fn respond(&self, request: &AnswerRequest) -> Result<Answer> {
        let span = tracing::info_span!(
            "respond",
            pipeline = %request.pipeline_id,
            surface = %request.surface,
            user = %request.user_id,
        );
        self.respond_inner(request).instrument(span).await
    }

    async fn respond_inner(&self, request: &AnswerRequest) -> Result<Answer> {
        let start = Instant::now();
        metrics::counter!("advisor_requests_total", "surface" => request.surface.as_str())
            .increment(1);

        let context = self.recent_context(request.instance_id.as_deref()).await;

        let retrieval = self
            .retriever
            .retrieve(&request.query, self.target_min, self.target_max)
            .await;
        tracing::debug!(
            instructions = retrieval.len(),
            degraded = retrieval.degraded,
            "Instructions retrieved"
        );

        let base_config =
            self.optimizer
                .config_for(&request.pipeline_id, &request.query, request.surface);
        let plan = self
            .planner
            .plan(&request.query, base_config.max_output_tokens)
            .await;
        let config = adjust_config(base_config, &plan);

        let addendum =
            self.optimizer
                .prompt_addendum_for(&request.pipeline_id, &request.query, request.surface);
        let prompt = PromptBuilder::new()
            .system_prompt(DEFAULT_SYSTEM_PROMPT)
            .system_prompt(plan_system_prompt(&plan))
            .with_instructions(&retrieval)
            .with_addendum(&addendum)
            .with_history(&context)
            .user_message(structured_prompt(&request.query, &plan))
            .build();

        let (text, provider, model, fallback) = match self.chain.generate(&prompt, &config).await {
            Ok(outcome) => {
                let text = self
                    .repair_truncation(&request.query, &plan, &config, outcome.text)
                    .await;
                (text, outcome.provider, outcome.model, false)
            }
            Err(e) => {
                tracing::error!(error = %e, "Generation exhausted, returning apology");
                metrics::counter!("advisor_fallbacks_total", "stage" => "generation").increment(1);
                (
                    messages::GENERATION_APOLOGY.to_string(),
                    NO_PROVIDER.to_string(),
                    NO_PROVIDER.to_string(),
                    true,
                )
            }
        };

        if !fallback {
            let quality = self
                .optimizer
                .score(&text, &request.pipeline_id, &request.query);
            metrics::histogram!("advisor_quality_score").record(quality.score as f64);
            tracing::debug!(
                score = quality.score,
                issues = ?quality.feedback,
                "Response quality assessed"
            );
        }

        let (instance_id, title) = self.persist(request, &text).await;

        let elapsed_ms = start.elapsed().as_millis() as u64;
        metrics::histogram!("advisor_respond_latency_ms").record(elapsed_ms as f64);
        tracing::info!(
            provider = %provider,
            fallback,
            split = plan.should_split,
            complexity = plan.complexity.as_str(),
            chars = text.len(),
            elapsed_ms,
            "Response ready"
        );

        Ok(Answer {
            text,
            instance_id,
            title,
            provider,
            model,
            fallback,
        })
    }

    /// Finalize a generated answer, first repairing it if it came back cut off.
    /// A failed compressed retry keeps the original answer.
    async fn repair_truncation(
        &self,
        question: &str,
        plan: &ResponsePlan,
        config: &GenerationConfig,
        raw: String,
    ) -> String {
        match truncation_repair(question, plan, &raw, config) {
            None => self.post_processor.finalize(&raw),
            Some(TruncationRepair::Continue) => {
                metrics::counter!("advisor_truncations_total", "repair" => "continue")
                    .increment(1);
                mark_continued(&self.post_processor.finalize(&raw))
            }
            Some(TruncationRepair::Compress { messages, config }) => {
                metrics::counter!("advisor_truncations_total", "repair" => "compress")
                    .increment(1);
                tracing::debug!(
                    max_tokens = config.max_output_tokens,
                    "Answer looks truncated, asking for a compressed version"
                );
                match self.chain.generate(&messages, &config).await {
                    Ok(outcome) if !outcome.text.trim().is_empty() => {
                        self.post_processor.finalize(&outcome.text)
                    }
                    Ok(_) => self.post_processor.finalize(&raw),
                    Err(e) => {
                        tracing::warn!(error = %e, "Compressed retry failed, keeping answer");
                        self.post_processor.finalize(&raw)
                    }
                }
            }
        }
    }

    async fn recent_context(&self, instance_id: Option<&str>) -> Vec<ChatTurn> {
        let (Some(history), Some(instance_id)) = (&self.history, instance_id) else {
            return Vec::new();
        };
        if self.context_turns == 0 {
            return Vec::new();
        }
        match history.recent_turns(instance_id, self.context_turns).await {
            Ok(turns) => turns,
            Err(e) => {
                tracing::warn!(error = %e, instance_id, "Could not load recent turns");
                Vec::new()
            }
        }
    }

    /// Append both turns, then title the instance if it still has a placeholder
    async fn persist(
        &self,
        request: &AnswerRequest,
        answer: &str,
    ) -> (Option<String>, Option<String>) {
        let Some(history) = &self.history else {
            return (request.instance_id.clone(), None);
        };

        let instance_id = match history
            .append(
                &request.user_id,
                request.instance_id.as_deref(),
                ChatTurn::user(request.query.clone()),
            )
            .await
        {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(error = %e, "Could not store user turn");
                return (request.instance_id.clone(), None);
            }
        };

        if let Err(e) = history
            .append(&request.user_id, Some(&instance_id), ChatTurn::assistant(answer))
            .await
        {
            tracing::warn!(error = %e, instance_id = %instance_id, "Could not store answer turn");
        }

        let title = self.maybe_title(history.as_ref(), &instance_id, &request.query).await;
        (Some(instance_id), title)
    }

    /// Title the instance while its title is generic. At most one title
    /// request runs per instance, and the write only lands on a generic title.
    async fn maybe_title(
        &self,
        history: &dyn ChatHistoryStore,
        instance_id: &str,
        query: &str,
    ) -> Option<String> {
        let Some(_claim) = TitleClaim::acquire(&self.titling, instance_id) else {
            tracing::debug!(instance_id, "Title already in progress");
            return current_title(history, instance_id).await;
        };

        let instance = match history.get_instance(instance_id).await {
            Ok(Some(instance)) => instance,
            Ok(None) => return None,
            Err(e) => {
                tracing::debug!(error = %e, "Could not read instance for titling");
                return None;
            }
        };

        if !TitleGenerator::should_generate(&instance.title) {
            return Some(instance.title);
        }

        let first_message = instance.first_user_message().unwrap_or(query);
        let title = self.titles.generate(first_message).await;
        match history.set_title_if_generic(instance_id, &title).await {
            Ok(true) => {
                tracing::info!(instance_id, title = %title, "Conversation titled");
                Some(title)
            }
            Ok(false) => current_title(history, instance_id).await,
            Err(e) => {
                tracing::debug!(error = %e, "Title update failed");
                Some(instance.title)
            }
        }
    }

    /// Streaming variant: `Started`, one `Chunk` per sentence of the finished
    /// answer, then `Complete` (or `Failed`).
    pub fn respond_stream(
        self: Arc<Self>,
        request: AnswerRequest,
        session_id: String,
    ) -> BoxStream<'static, PipelineEvent> {
        Box::pin(async_stream::stream! {
            yield PipelineEvent::Started { session_id };

            match self.respond(&request).await {
                Ok(answer) => {
                    for (index, text) in sentence_chunks(&answer.text).into_iter().enumerate() {
                        yield PipelineEvent::Chunk { index, text };
                    }
                    yield PipelineEvent::Complete {
                        text: answer.text,
                        instance_id: answer.instance_id,
                        title: answer.title,
                    };
                }
                Err(e) => {
                    tracing::error!(error = %e, "Streaming response failed");
                    yield PipelineEvent::Failed { message: e.to_string() };
                }
            }
        })
    }
}

async fn current_title(history: &dyn ChatHistoryStore, instance_id: &str) -> Option<String> {
    match history.get_instance(instance_id).await {
        Ok(instance) => instance.map(|i| i.title),
        Err(e) => {
            tracing::debug!(error = %e, "Could not read instance title");
            None
        }
    }
}

#[async_trait]
impl AnswerGenerator for Responder {
    async fn generate_answer(&self, request: AnswerRequest) -> Result<Answer> {
        self.respond(&request).await
    }
}
