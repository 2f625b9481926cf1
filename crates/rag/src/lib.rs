//! Instruction retrieval (RAG)
//!
//! Features:
//! - Staged confidence cascade: high, then medium, then core categories
//! - Degradation to a core-category fetch when the store or embedder fails
//! - In-memory instruction store with cosine similarity search
//! - Hash embedder for offline use and an HTTP embeddings client
//! - YAML/JSON knowledge loading

pub mod embeddings;
pub mod http_embeddings;
pub mod knowledge_loader;
pub mod retriever;
pub mod store;

pub use embeddings::{cosine_similarity, EmbeddingConfig, SimpleEmbedder};
pub use http_embeddings::{HttpEmbedder, HttpEmbeddingConfig};
pub use knowledge_loader::{InstructionDocument, InstructionFile, KnowledgeLoader};
pub use retriever::{CascadeConfig, CascadeRetriever};
pub use store::InMemoryInstructionStore;

use thiserror::Error;

/// RAG errors
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl From<RagError> for advisor_core::Error {
    fn from(err: RagError) -> Self {
        advisor_core::Error::RetrievalStoreUnavailable(err.to_string())
    }
}
