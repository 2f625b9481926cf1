//! Advisor Server
//!
//! HTTP, server-sent event and WebSocket endpoints over the response and
//! voice pipelines.

pub mod http;
pub mod message;
pub mod metrics;
pub mod state;
pub mod websocket;

pub use http::create_router;
pub use message::EventMessage;
pub use metrics::{init_metrics, metrics_handler, record_request};
pub use state::AppState;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Conversation error: {0}")]
    History(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::RateLimit(_) => StatusCode::TOO_MANY_REQUESTS,
            ServerError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::History(_) => StatusCode::CONFLICT,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<advisor_core::Error> for ServerError {
    fn from(err: advisor_core::Error) -> Self {
        use advisor_core::Error;
        match err {
            Error::ProviderRateLimited { .. } => ServerError::RateLimit(err.to_string()),
            Error::ProviderUnavailable { .. }
            | Error::RetrievalStoreUnavailable(_)
            | Error::GenerationExhausted { .. }
            | Error::SynthesisFailed(_)
            | Error::TranscriptionFailed(_) => ServerError::Unavailable(err.to_string()),
            Error::History(msg) => ServerError::History(msg),
            Error::PlanningFailed(_) | Error::Config(_) | Error::Internal(_) => {
                ServerError::Internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
