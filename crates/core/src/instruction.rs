//! Instruction corpus types and the bounded retrieval result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored knowledge snippet. Authored externally, read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl Instruction {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            category: category.into(),
            priority: 0,
            active: true,
            embedding: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.updated_at = created_at;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// Similarity hit returned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredInstruction {
    pub instruction: Instruction,
    pub similarity: f32,
}

/// Which cascade stage produced an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStage {
    /// High-confidence semantic search
    HighConfidence,
    /// Medium-confidence semantic search
    MediumConfidence,
    /// Always-active core categories
    Core,
    /// Cached baseline for empty queries
    Baseline,
    /// Direct category fetch after a stage failure
    Degraded,
}

impl RetrievalStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalStage::HighConfidence => "high_confidence",
            RetrievalStage::MediumConfidence => "medium_confidence",
            RetrievalStage::Core => "core",
            RetrievalStage::Baseline => "baseline",
            RetrievalStage::Degraded => "degraded",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedInstruction {
    pub instruction: Instruction,
    /// Present for semantic hits only
    pub similarity: Option<f32>,
    pub stage: RetrievalStage,
}

/// Ordered, title-unique instruction set bounded by the caller's target range.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalResult {
    pub items: Vec<RetrievedInstruction>,
    /// Set when a stage failed and the core fallback was used instead
    pub degraded: bool,
    pub stages_run: Vec<RetrievalStage>,
}

impl RetrievalResult {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn titles(&self) -> Vec<&str> {
        self.items.iter().map(|i| i.instruction.title.as_str()).collect()
    }

    pub fn ran(&self, stage: RetrievalStage) -> bool {
        self.stages_run.contains(&stage)
    }

    /// Render as a context block for the system prompt.
    pub fn as_context(&self) -> String {
        self.items
            .iter()
            .map(|item| format!("### {}\n{}", item.instruction.title, item.instruction.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_defaults_active_when_deserialized() {
        let json = r#"{
            "id": "i1",
            "title": "Scorecard basics",
            "content": "Track weekly numbers.",
            "category": "core",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        }"#;
        let instruction: Instruction = serde_json::from_str(json).unwrap();
        assert!(instruction.active);
        assert_eq!(instruction.priority, 0);
        assert!(instruction.embedding.is_none());
    }

    #[test]
    fn test_context_rendering() {
        let result = RetrievalResult {
            items: vec![RetrievedInstruction {
                instruction: Instruction::new("a", "Tone", "Be direct.", "core"),
                similarity: None,
                stage: RetrievalStage::Core,
            }],
            degraded: false,
            stages_run: vec![RetrievalStage::Core],
        };
        assert_eq!(result.as_context(), "### Tone\nBe direct.");
        assert!(result.ran(RetrievalStage::Core));
        assert!(!result.ran(RetrievalStage::HighConfidence));
    }
}
