//! Knowledge Base Loader
//!
//! Loads instructions from YAML/JSON files into the in-memory store,
//! embedding each one with the configured embedder.

use serde::{Deserialize, Serialize};
use std::path::Path;

use advisor_core::{Embedder, Instruction};

use crate::{InMemoryInstructionStore, RagError};

/// One instruction as written in a knowledge file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructionDocument {
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Precomputed vector; generated on load when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

fn default_active() -> bool {
    true
}

/// Knowledge file format
#[derive(Debug, Serialize, Deserialize)]
pub struct InstructionFile {
    #[serde(default)]
    pub version: Option<String>,
    pub instructions: Vec<InstructionDocument>,
}

pub struct KnowledgeLoader;

impl KnowledgeLoader {
    /// Load every `.yaml`, `.yml` and `.json` file in `knowledge_dir`.
    ///
    /// A missing directory loads nothing. Files that fail to parse are logged
    /// and skipped.
    ///
    /// # Returns
    /// Number of instructions loaded
    pub async fn load_directory(
        knowledge_dir: &Path,
        store: &InMemoryInstructionStore,
        embedder: &dyn Embedder,
    ) -> Result<usize, RagError> {
        if !knowledge_dir.exists() {
            tracing::warn!(
                path = %knowledge_dir.display(),
                "Knowledge directory does not exist"
            );
            return Ok(0);
        }

        let entries = std::fs::read_dir(knowledge_dir)
            .map_err(|e| RagError::Index(format!("Failed to read directory: {}", e)))?;

        let mut paths: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("yaml" | "yml" | "json")
                )
            })
            .collect();
        paths.sort();

        let mut total_count = 0;
        for path in paths {
            match Self::load_file(&path, store, embedder).await {
                Ok(count) => {
                    tracing::info!(
                        file = %path.display(),
                        instructions = count,
                        "Loaded knowledge file"
                    );
                    total_count += count;
                },
                Err(e) => {
                    tracing::error!(
                        file = %path.display(),
                        error = %e,
                        "Failed to load knowledge file"
                    );
                },
            }
        }

        tracing::info!(
            directory = %knowledge_dir.display(),
            total_instructions = total_count,
            "Knowledge base loading complete"
        );

        Ok(total_count)
    }

    /// Load a single knowledge file
    pub async fn load_file(
        path: &Path,
        store: &InMemoryInstructionStore,
        embedder: &dyn Embedder,
    ) -> Result<usize, RagError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RagError::Index(format!("Failed to read file: {}", e)))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let file: InstructionFile = match extension {
            "json" => serde_json::from_str(&content)
                .map_err(|e| RagError::Index(format!("JSON parse error: {}", e)))?,
            "yaml" | "yml" => serde_yaml::from_str(&content)
                .map_err(|e| RagError::Index(format!("YAML parse error: {}", e)))?,
            _ => {
                return Err(RagError::Index(format!(
                    "Unsupported file type: {}",
                    extension
                )))
            },
        };

        let mut instructions = Vec::with_capacity(file.instructions.len());
        for doc in file.instructions {
            let embedding = match doc.embedding {
                Some(v) if v.len() == embedder.dimension() => v,
                _ => embedder
                    .embed(&format!("{}\n{}", doc.title, doc.content))
                    .await
                    .map_err(|e| RagError::Embedding(e.to_string()))?,
            };

            let mut instruction = Instruction::new(doc.id, doc.title, doc.content, doc.category)
                .with_priority(doc.priority)
                .with_embedding(embedding);
            instruction.active = doc.active;
            instructions.push(instruction);
        }

        let count = instructions.len();
        store.upsert(instructions);
        Ok(count)
    }

    /// Write an example file showing the expected format
    pub fn create_sample_file(path: &Path) -> Result<(), RagError> {
        let sample = InstructionFile {
            version: Some("1.0".to_string()),
            instructions: vec![
                InstructionDocument {
                    id: "core_format_001".to_string(),
                    title: "Answer structure".to_string(),
                    content: "Open with a one-sentence summary, then use ## headings for each \
                              main section and finish with numbered next steps."
                        .to_string(),
                    category: "formatting".to_string(),
                    priority: 10,
                    active: true,
                    embedding: None,
                },
                InstructionDocument {
                    id: "core_tone_001".to_string(),
                    title: "Advisor tone".to_string(),
                    content: "Be direct and practical. Speak to the owner of a small trades \
                              business and avoid jargon."
                        .to_string(),
                    category: "tone".to_string(),
                    priority: 5,
                    active: true,
                    embedding: None,
                },
            ],
        };

        let yaml = serde_yaml::to_string(&sample)
            .map_err(|e| RagError::Index(format!("Failed to serialize: {}", e)))?;

        std::fs::write(path, yaml)
            .map_err(|e| RagError::Index(format!("Failed to write file: {}", e)))?;

        tracing::info!(path = %path.display(), "Created sample knowledge file");

        Ok(())
    }
}
