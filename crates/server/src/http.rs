//! HTTP Endpoints
//!
//! REST and SSE API for answers and recorded voice turns. There is no
//! request timeout: each answer path is bounded by its provider retry budgets.

use std::convert::Infallible;
use std::str::FromStr;

use axum::{
    extract::{Json, State},
    http::{HeaderValue, Method, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use advisor_agent::PipelineId;
use advisor_config::constants::pipeline;
use advisor_core::{AnswerRequest, Surface};
use advisor_pipeline::{PipelineSummary, VoiceRequest};

use crate::message::EventMessage;
use crate::metrics::{metrics_handler, record_request};
use crate::state::AppState;
use crate::websocket::voice_ws;
use crate::ServerError;

const DEFAULT_ORIGIN: &str = "http://localhost:3000";

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let cors_layer = build_cors_layer(
        &state.config.server.cors_origins,
        state.config.server.cors_enabled,
    );

    Router::new()
        .route("/api/respond", post(respond))
        .route("/api/respond/stream", post(respond_stream))
        .route("/api/voice", post(voice))
        .route("/api/pipelines/active", get(active_pipelines))
        .route("/ws/voice", get(voice_ws))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

/// Build CORS layer from configured origins
///
/// - Disabled: permissive (development only)
/// - No valid origins: localhost:3000
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins (NOT FOR PRODUCTION)");
        return CorsLayer::permissive();
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if parsed_origins.is_empty() {
        tracing::info!("No usable CORS origins configured, defaulting to {}", DEFAULT_ORIGIN);
        return layer.allow_origin(HeaderValue::from_static(DEFAULT_ORIGIN));
    }

    tracing::info!("CORS configured with {} origins", parsed_origins.len());
    layer.allow_origin(parsed_origins)
}

pub(crate) fn resolve_pipeline(pipeline_id: Option<String>) -> Result<String, ServerError> {
    match pipeline_id {
        None => Ok(pipeline::DEFAULT_PIPELINE.to_string()),
        Some(id) => PipelineId::from_str(&id)
            .map(|id| id.as_str().to_string())
            .map_err(|e| ServerError::InvalidRequest(e.to_string())),
    }
}

pub(crate) fn require(value: &str, field: &str) -> Result<(), ServerError> {
    if value.trim().is_empty() {
        return Err(ServerError::InvalidRequest(format!("{} is required", field)));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct RespondBody {
    pub query: String,
    pub user_id: String,
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub pipeline_id: Option<String>,
}

impl RespondBody {
    /// A blank query is accepted; retrieval answers it from the baseline set
    fn into_request(self, surface: Surface) -> Result<AnswerRequest, ServerError> {
        require(&self.user_id, "user_id")?;
        Ok(AnswerRequest {
            query: self.query,
            user_id: self.user_id,
            instance_id: self.instance_id,
            pipeline_id: resolve_pipeline(self.pipeline_id)?,
            surface,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct RespondResponse {
    pub text: String,
    pub instance_id: Option<String>,
    pub title: Option<String>,
    pub fallback: bool,
}

/// POST /api/respond
async fn respond(
    State(state): State<AppState>,
    Json(body): Json<RespondBody>,
) -> Result<Json<RespondResponse>, ServerError> {
    let result = async {
        let request = body.into_request(Surface::Text)?;
        let answer = state.responder.respond(&request).await?;
        Ok::<_, ServerError>(RespondResponse {
            text: answer.text,
            instance_id: answer.instance_id,
            title: answer.title,
            fallback: answer.fallback,
        })
    }
    .await;

    match &result {
        Ok(_) => record_request("respond", StatusCode::OK),
        Err(e) => record_request("respond", e.status()),
    }
    result.map(Json)
}

/// POST /api/respond/stream
///
/// One SSE event per pipeline event; the event name is the variant name.
async fn respond_stream(
    State(state): State<AppState>,
    Json(body): Json<RespondBody>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServerError> {
    let request = body.into_request(Surface::Streaming).map_err(|e| {
        record_request("respond_stream", e.status());
        e
    })?;
    record_request("respond_stream", StatusCode::OK);

    let session_id = uuid::Uuid::new_v4().to_string();
    let events = state
        .responder
        .clone()
        .respond_stream(request, session_id)
        .map(|event| {
            let name = event.name();
            let message = EventMessage::from(event);
            Ok(Event::default().event(name).data(message.to_json()))
        });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

#[derive(Debug, Deserialize)]
pub struct VoiceBody {
    /// Base64 encoded recording
    pub audio: String,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
    pub user_id: String,
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub pipeline_id: Option<String>,
    #[serde(default)]
    pub accent: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
}

fn default_mime_type() -> String {
    "audio/webm".to_string()
}

#[derive(Debug, Serialize)]
pub struct VoiceResponse {
    pub session_id: String,
    pub transcript: String,
    pub low_confidence: bool,
    pub text: String,
    pub instance_id: Option<String>,
    pub title: Option<String>,
    /// Base64 encoded synthesized speech
    pub audio: Option<String>,
    pub audio_mime_type: Option<String>,
    pub voice_id: String,
    /// Present when the client has to speak the answer itself
    pub speech_text: Option<String>,
    pub summary: Option<PipelineSummary>,
}

/// POST /api/voice
async fn voice(
    State(state): State<AppState>,
    Json(body): Json<VoiceBody>,
) -> Result<Json<VoiceResponse>, ServerError> {
    let request = voice_request(body).map_err(|e| {
        record_request("voice", e.status());
        e
    })?;

    let outcome = state.voice.run(request).await;
    record_request("voice", StatusCode::OK);

    let (audio, audio_mime_type) = match outcome.audio {
        Some(audio) => (Some(BASE64.encode(&audio.bytes)), Some(audio.mime_type)),
        None => (None, None),
    };

    Ok(Json(VoiceResponse {
        session_id: outcome.session_id,
        transcript: outcome.transcript,
        low_confidence: outcome.low_confidence,
        text: outcome.text,
        instance_id: outcome.instance_id,
        title: outcome.title,
        audio,
        audio_mime_type,
        voice_id: outcome.voice_id,
        speech_text: outcome.speech_text,
        summary: outcome.summary,
    }))
}

fn voice_request(body: VoiceBody) -> Result<VoiceRequest, ServerError> {
    require(&body.user_id, "user_id")?;
    let audio = BASE64
        .decode(body.audio.trim())
        .map_err(|e| ServerError::InvalidRequest(format!("audio is not valid base64: {}", e)))?;
    if audio.is_empty() {
        return Err(ServerError::InvalidRequest("audio is empty".to_string()));
    }

    Ok(VoiceRequest {
        session_id: None,
        user_id: body.user_id,
        instance_id: body.instance_id,
        pipeline_id: resolve_pipeline(body.pipeline_id)?,
        audio,
        mime_type: body.mime_type,
        accent: body.accent,
        gender: body.gender,
    })
}

/// GET /api/pipelines/active
async fn active_pipelines(State(state): State<AppState>) -> Json<serde_json::Value> {
    let sessions = state.tracker().list_active();
    Json(serde_json::json!({
        "count": sessions.len(),
        "sessions": sessions,
    }))
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let providers = &state.config.providers;
    let status = if state.knowledge_count > 0 {
        "healthy"
    } else {
        "degraded"
    };

    Json(serde_json::json!({
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
        "checks": {
            "knowledge": { "instructions": state.knowledge_count },
            "transcription": { "enabled": providers.stt.enabled },
            "synthesis": { "enabled": providers.tts.enabled },
            "active_pipelines": state.tracker().len(),
        }
    }))
}
