//! WebSocket Handler
//!
//! `GET /ws/voice?user_id=...` keeps one connection per speaker. Every
//! inbound recording runs one voice session and its events are forwarded as
//! JSON text frames until `complete`. Sessions on a connection run one at a
//! time and share the chat instance opened by the first.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};

use advisor_core::PipelineEvent;
use advisor_pipeline::VoiceRequest;

use crate::http::{require, resolve_pipeline};
use crate::message::EventMessage;
use crate::state::AppState;
use crate::ServerError;

#[derive(Debug, Deserialize)]
pub struct VoiceSocketParams {
    pub user_id: String,
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub pipeline_id: Option<String>,
    #[serde(default)]
    pub accent: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// Client frames
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Base64 encoded recording
    Audio {
        data: String,
        #[serde(default)]
        mime_type: Option<String>,
    },
    Ping,
    EndSession,
}

/// Frames that are not pipeline events
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ControlMessage {
    Pong,
    Error { message: String },
}

/// Per-connection defaults applied to every session
#[derive(Debug, Clone)]
struct Connection {
    user_id: String,
    instance_id: Option<String>,
    pipeline_id: String,
    accent: Option<String>,
    gender: Option<String>,
    mime_type: String,
}

impl Connection {
    fn request(&self, audio: Vec<u8>, mime_type: Option<String>) -> VoiceRequest {
        VoiceRequest {
            session_id: None,
            user_id: self.user_id.clone(),
            instance_id: self.instance_id.clone(),
            pipeline_id: self.pipeline_id.clone(),
            audio,
            mime_type: mime_type.unwrap_or_else(|| self.mime_type.clone()),
            accent: self.accent.clone(),
            gender: self.gender.clone(),
        }
    }
}

/// GET /ws/voice
pub async fn voice_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<VoiceSocketParams>,
) -> Result<Response, ServerError> {
    require(&params.user_id, "user_id")?;
    let connection = Connection {
        pipeline_id: resolve_pipeline(params.pipeline_id)?,
        user_id: params.user_id,
        instance_id: params.instance_id,
        accent: params.accent,
        gender: params.gender,
        mime_type: params.mime_type.unwrap_or_else(|| "audio/webm".to_string()),
    };

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, connection)))
}

fn control(message: ControlMessage) -> Message {
    Message::Text(serde_json::to_string(&message).unwrap_or_default())
}

async fn handle_socket(socket: WebSocket, state: AppState, mut connection: Connection) {
    let (mut sender, mut receiver) = socket.split();
    tracing::info!(user = %connection.user_id, "Voice socket connected");

    while let Some(frame) = receiver.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(error = %e, "Voice socket read failed");
                break;
            }
        };

        let request = match frame {
            Message::Binary(audio) if !audio.is_empty() => connection.request(audio, None),
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Audio { data, mime_type }) => match BASE64.decode(data.trim()) {
                    Ok(audio) if !audio.is_empty() => connection.request(audio, mime_type),
                    Ok(_) => {
                        let _ = sender
                            .send(control(ControlMessage::Error {
                                message: "audio is empty".to_string(),
                            }))
                            .await;
                        continue;
                    }
                    Err(e) => {
                        let _ = sender
                            .send(control(ControlMessage::Error {
                                message: format!("audio is not valid base64: {}", e),
                            }))
                            .await;
                        continue;
                    }
                },
                Ok(ClientMessage::Ping) => {
                    let _ = sender.send(control(ControlMessage::Pong)).await;
                    continue;
                }
                Ok(ClientMessage::EndSession) => break,
                Err(e) => {
                    let _ = sender
                        .send(control(ControlMessage::Error {
                            message: format!("unrecognized message: {}", e),
                        }))
                        .await;
                    continue;
                }
            },
            Message::Close(_) => break,
            _ => continue,
        };

        let mut events = state.voice.clone().run_stream(request);
        while let Some(event) = events.next().await {
            if let PipelineEvent::Complete {
                instance_id: Some(id),
                ..
            } = &event
            {
                connection.instance_id = Some(id.clone());
            }

            let frame = Message::Text(EventMessage::from(event).to_json());
            if sender.send(frame).await.is_err() {
                // Dropping `events` lets the session notice and fail itself
                tracing::debug!(user = %connection.user_id, "Voice socket closed mid-session");
                return;
            }
        }
    }

    tracing::info!(user = %connection.user_id, "Voice socket disconnected");
}
