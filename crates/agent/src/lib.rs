//! Answer shaping and the text response path
//!
//! Features:
//! - Response planning (outline, complexity, token estimate, split decision)
//! - Quality optimizer (pipeline profiles, query classification, scoring)
//! - Post-processing (tool links, structure-aware trimming)
//! - Conversation title generation
//! - `Responder`: retrieval, planning, generation with fallback, history

pub mod optimizer;
pub mod planner;
pub mod post_process;
pub mod responder;
pub mod title;

pub use optimizer::{
    analyze_query, classify_query, PipelineId, PipelineProfile, QualityOptimizer, QualityScore,
    QueryAnalysis, QueryType, ResponseStyle,
};
pub use planner::ResponsePlanner;
pub use post_process::{sentence_chunks, PostProcessor};
pub use responder::Responder;
pub use title::TitleGenerator;

use thiserror::Error;

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Unknown pipeline: {0}")]
    UnknownPipeline(String),

    #[error("Invalid pattern: {0}")]
    Pattern(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<AgentError> for advisor_core::Error {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::UnknownPipeline(_) | AgentError::Config(_) => {
                advisor_core::Error::Config(err.to_string())
            }
            AgentError::Pattern(_) => advisor_core::Error::Internal(err.to_string()),
        }
    }
}
