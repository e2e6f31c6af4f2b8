use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::models::OutboundMessage;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct DevMessage {
    pub session_id: String,
    pub message: String,
    pub turn_id: Option<String>,
}

#[derive(Serialize)]
pub struct DevResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<OutboundMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Runs one turn without a messaging channel, for local testing.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DevMessage>,
) -> Response {
    let session_id = payload.session_id.trim();
    if session_id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(DevResponse {
                success: false,
                reply: None,
                error: Some("session_id is required".to_string()),
            }),
        )
            .into_response();
    }

    match state
        .engine
        .handle_turn(session_id, payload.turn_id.as_deref(), &payload.message)
        .await
    {
        Ok(reply) => Json(DevResponse {
            success: true,
            reply: Some(reply),
            error: None,
        })
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, session_id, "dev turn failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(DevResponse {
                    success: false,
                    reply: None,
                    error: Some(e.to_string()),
                }),
            )
                .into_response()
        }
    }
}
