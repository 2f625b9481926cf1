//! In-memory instruction store
//!
//! Holds the instruction corpus for the process and answers category and
//! similarity queries. Only active instructions are ever returned.

use std::cmp::Ordering;

use async_trait::async_trait;
use parking_lot::RwLock;

use advisor_core::{Instruction, InstructionStore, Result, ScoredInstruction};

use crate::embeddings::cosine_similarity;

#[derive(Default)]
pub struct InMemoryInstructionStore {
    instructions: RwLock<Vec<Instruction>>,
}

impl InMemoryInstructionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instructions(instructions: Vec<Instruction>) -> Self {
        let store = Self::new();
        store.upsert(instructions);
        store
    }

    /// Insert or replace by id
    pub fn upsert(&self, instructions: impl IntoIterator<Item = Instruction>) {
        let mut stored = self.instructions.write();
        for instruction in instructions {
            match stored.iter_mut().find(|i| i.id == instruction.id) {
                Some(existing) => *existing = instruction,
                None => stored.push(instruction),
            }
        }
    }

    pub fn remove(&self, id: &str) -> bool {
        let mut stored = self.instructions.write();
        let before = stored.len();
        stored.retain(|i| i.id != id);
        stored.len() != before
    }

    pub fn len(&self) -> usize {
        self.instructions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.read().is_empty()
    }

    /// Number of active instructions that carry an embedding
    pub fn embedded_count(&self) -> usize {
        self.instructions
            .read()
            .iter()
            .filter(|i| i.active && i.embedding.is_some())
            .count()
    }
}

/// Priority descending, then oldest first
fn priority_order(a: &Instruction, b: &Instruction) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.created_at.cmp(&b.created_at))
}

#[async_trait]
impl InstructionStore for InMemoryInstructionStore {
    async fn query_by_category(&self, categories: &[String]) -> Result<Vec<Instruction>> {
        let mut matches: Vec<Instruction> = self
            .instructions
            .read()
            .iter()
            .filter(|i| i.active && categories.iter().any(|c| c.eq_ignore_ascii_case(&i.category)))
            .cloned()
            .collect();
        matches.sort_by(priority_order);
        Ok(matches)
    }

    async fn query_by_similarity(
        &self,
        embedding: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<ScoredInstruction>> {
        let mut hits: Vec<ScoredInstruction> = self
            .instructions
            .read()
            .iter()
            .filter(|i| i.active)
            .filter_map(|i| {
                let similarity = cosine_similarity(embedding, i.embedding.as_deref()?);
                (similarity >= threshold).then(|| ScoredInstruction {
                    instruction: i.clone(),
                    similarity,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| priority_order(&a.instruction, &b.instruction))
        });
        hits.truncate(limit);
        Ok(hits)
    }
}
