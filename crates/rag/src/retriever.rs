//! Cascade Retriever
//!
//! Assembles a bounded, title-unique instruction set in stages:
//!
//! 1. High-confidence similarity search, up to `target_max`
//! 2. Medium-confidence search, only if still below `target_min`
//! 3. Core categories, only if still below `target_min`
//!
//! The query is embedded once and reused. Any store or embedder failure
//! degrades the whole call to a direct fetch of the core categories, so
//! retrieval never blocks the rest of the pipeline.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use advisor_config::RagConfig;
use advisor_core::{
    Embedder, Error, InstructionStore, Result, RetrievalResult, RetrievalStage,
    RetrievedInstruction, Retriever,
};

/// Retriever configuration
#[derive(Debug, Clone)]
pub struct CascadeConfig {
    pub high_confidence_threshold: f32,
    pub medium_confidence_threshold: f32,
    /// Always-eligible categories used by the last stage and on degradation
    pub core_categories: Vec<String>,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self::from(&RagConfig::default())
    }
}

impl From<&RagConfig> for CascadeConfig {
    fn from(config: &RagConfig) -> Self {
        Self {
            high_confidence_threshold: config.high_confidence_threshold,
            medium_confidence_threshold: config.medium_confidence_threshold,
            core_categories: config.core_categories.clone(),
        }
    }
}

/// Accumulates items while enforcing title uniqueness
#[derive(Default)]
struct Assembly {
    items: Vec<RetrievedInstruction>,
    titles: HashSet<String>,
    stages_run: Vec<RetrievalStage>,
}

impl Assembly {
    /// Returns false when the title is already present
    fn push(&mut self, item: RetrievedInstruction) -> bool {
        if !self.titles.insert(item.instruction.title.clone()) {
            return false;
        }
        self.items.push(item);
        true
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn finish(mut self, target_max: usize, degraded: bool) -> RetrievalResult {
        self.items.truncate(target_max);
        RetrievalResult {
            items: self.items,
            degraded,
            stages_run: self.stages_run,
        }
    }
}

pub struct CascadeRetriever {
    store: Arc<dyn InstructionStore>,
    embedder: Arc<dyn Embedder>,
    config: CascadeConfig,
    /// Core set served for empty queries, filled on first successful fetch
    baseline: RwLock<Option<Vec<RetrievedInstruction>>>,
}

impl CascadeRetriever {
    pub fn new(
        store: Arc<dyn InstructionStore>,
        embedder: Arc<dyn Embedder>,
        config: CascadeConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
            baseline: RwLock::new(None),
        }
    }

    async fn cascade(
        &self,
        query: &str,
        target_min: usize,
        target_max: usize,
    ) -> Result<RetrievalResult> {
        let embedding = self.embedder.embed(query).await?;
        let mut assembly = Assembly::default();

        // Stage A
        assembly.stages_run.push(RetrievalStage::HighConfidence);
        let hits = self
            .store
            .query_by_similarity(&embedding, self.config.high_confidence_threshold, target_max)
            .await?;
        for hit in hits {
            assembly.push(RetrievedInstruction {
                instruction: hit.instruction,
                similarity: Some(hit.similarity),
                stage: RetrievalStage::HighConfidence,
            });
        }

        // Stage B
        if assembly.len() < target_min {
            assembly.stages_run.push(RetrievalStage::MediumConfidence);
            let hits = self
                .store
                .query_by_similarity(&embedding, self.config.medium_confidence_threshold, target_max)
                .await?;
            for hit in hits {
                if assembly.len() >= target_min {
                    break;
                }
                assembly.push(RetrievedInstruction {
                    instruction: hit.instruction,
                    similarity: Some(hit.similarity),
                    stage: RetrievalStage::MediumConfidence,
                });
            }
        }

        // Stage C
        if assembly.len() < target_min {
            assembly.stages_run.push(RetrievalStage::Core);
            let core = self
                .store
                .query_by_category(&self.config.core_categories)
                .await?;
            for instruction in core {
                assembly.push(RetrievedInstruction {
                    instruction,
                    similarity: None,
                    stage: RetrievalStage::Core,
                });
            }
        }

        Ok(assembly.finish(target_max, false))
    }

    async fn fetch_core(&self, stage: RetrievalStage) -> Result<Vec<RetrievedInstruction>> {
        let core = self
            .store
            .query_by_category(&self.config.core_categories)
            .await?;
        Ok(core
            .into_iter()
            .map(|instruction| RetrievedInstruction {
                instruction,
                similarity: None,
                stage,
            })
            .collect())
    }

    async fn degraded(&self, target_max: usize, cause: &Error) -> RetrievalResult {
        tracing::warn!(error = %cause, "Retrieval degraded to core instructions");
        metrics::counter!("advisor_retrieval_degraded_total").increment(1);

        let mut assembly = Assembly::default();
        assembly.stages_run.push(RetrievalStage::Degraded);
        match self.fetch_core(RetrievalStage::Degraded).await {
            Ok(items) => {
                for item in items {
                    assembly.push(item);
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Core instruction fetch failed; continuing without instructions");
            }
        }
        assembly.finish(target_max, true)
    }

    async fn baseline(&self, target_max: usize) -> RetrievalResult {
        let cached = self.baseline.read().clone();
        let items = match cached {
            Some(items) => items,
            None => match self.fetch_core(RetrievalStage::Baseline).await {
                Ok(items) => {
                    let mut assembly = Assembly::default();
                    for item in items {
                        assembly.push(item);
                    }
                    *self.baseline.write() = Some(assembly.items.clone());
                    assembly.items
                }
                Err(e) => return self.degraded(target_max, &e).await,
            },
        };

        let mut assembly = Assembly::default();
        assembly.stages_run.push(RetrievalStage::Baseline);
        for item in items {
            assembly.push(item);
        }
        assembly.finish(target_max, false)
    }

    /// Drop the cached baseline, e.g. after reloading the corpus
    pub fn invalidate_baseline(&self) {
        *self.baseline.write() = None;
    }
}

#[async_trait]
impl Retriever for CascadeRetriever {
    async fn retrieve(&self, query: &str, target_min: usize, target_max: usize) -> RetrievalResult {
        if target_max == 0 {
            return RetrievalResult::default();
        }
        let target_min = target_min.min(target_max);

        let result = if query.trim().is_empty() {
            self.baseline(target_max).await
        } else {
            match self.cascade(query, target_min, target_max).await {
                Ok(result) => result,
                Err(e) => self.degraded(target_max, &e).await,
            }
        };

        for stage in &result.stages_run {
            metrics::counter!("advisor_retrieval_stage_total", "stage" => stage.as_str())
                .increment(1);
        }
        tracing::debug!(
            items = result.len(),
            degraded = result.degraded,
            stages = ?result.stages_run,
            "Retrieval complete"
        );

        result
    }
}
