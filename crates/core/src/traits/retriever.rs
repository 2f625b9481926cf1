//! Retrieval traits

use async_trait::async_trait;

use crate::{Instruction, Result, RetrievalResult, ScoredInstruction};

/// Text embedding capability
#[async_trait]
pub trait Embedder: Send + Sync + 'static {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn dimension(&self) -> usize;
}

/// Queryable instruction corpus.
///
/// Only active instructions are ever returned.
#[async_trait]
pub trait InstructionStore: Send + Sync + 'static {
    /// Instructions in any of `categories`, priority descending, oldest first on ties
    async fn query_by_category(&self, categories: &[String]) -> Result<Vec<Instruction>>;

    /// Instructions with cosine similarity >= `threshold`, best first, at most `limit`
    async fn query_by_similarity(
        &self,
        embedding: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<ScoredInstruction>>;
}

/// Query to bounded, deduplicated instruction set.
///
/// Infallible by contract: failures degrade to a fallback set.
#[async_trait]
pub trait Retriever: Send + Sync + 'static {
    async fn retrieve(&self, query: &str, target_min: usize, target_max: usize) -> RetrievalResult;
}
