//! Answer generation seam between the text path and the voice orchestrator

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Result, Surface};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub query: String,
    pub user_id: String,
    pub instance_id: Option<String>,
    pub pipeline_id: String,
    pub surface: Surface,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub instance_id: Option<String>,
    pub title: Option<String>,
    /// Provider that produced the text
    pub provider: String,
    pub model: String,
    /// True when every provider failed and `text` is the apology
    pub fallback: bool,
}

#[async_trait]
pub trait AnswerGenerator: Send + Sync + 'static {
    async fn generate_answer(&self, request: AnswerRequest) -> Result<Answer>;
}
