use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha1::Sha1;

use crate::services::conversation::RETRY_LATER;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

#[derive(Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Deserialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub messaging: Vec<MessagingEvent>,
}

#[derive(Deserialize)]
pub struct MessagingEvent {
    pub sender: Participant,
    pub message: Option<InboundMessage>,
}

#[derive(Deserialize)]
pub struct Participant {
    pub id: String,
}

#[derive(Deserialize)]
pub struct InboundMessage {
    pub mid: Option<String>,
    pub text: Option<String>,
    #[serde(default)]
    pub is_echo: bool,
}

/// Checks `X-Hub-Signature` (`sha1=<hex>`) against the raw request body.
fn verify_hub_signature(app_secret: &str, payload: &[u8], signature: &str) -> bool {
    let Some(digest) = signature.strip_prefix("sha1=") else {
        return false;
    };
    let Ok(expected) = hex::decode(digest) else {
        return false;
    };
    let mut mac = match Hmac::<Sha1>::new_from_slice(app_secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

// GET /webhook
pub async fn verify(State(state): State<Arc<AppState>>, Query(params): Query<VerifyParams>) -> Response {
    let expected = &state.config.instagram_verify_token;
    let subscribed = params.mode.as_deref() == Some("subscribe")
        && !expected.is_empty()
        && params.verify_token.as_deref() == Some(expected.as_str());

    if subscribed {
        tracing::info!("webhook subscription verified");
        (StatusCode::OK, params.challenge.unwrap_or_default()).into_response()
    } else {
        tracing::warn!(mode = ?params.mode, "webhook verification failed");
        (StatusCode::FORBIDDEN, "Verification failed").into_response()
    }
}

// POST /webhook
pub async fn receive(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    // Signature checks are skipped when no app secret is configured (dev mode).
    if !state.config.instagram_app_secret.is_empty() {
        let signature = headers
            .get("x-hub-signature")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if signature.is_empty() {
            tracing::warn!("missing X-Hub-Signature header");
            return (StatusCode::FORBIDDEN, "Missing signature").into_response();
        }
        if !verify_hub_signature(&state.config.instagram_app_secret, &body, signature) {
            tracing::warn!("invalid X-Hub-Signature");
            return (StatusCode::FORBIDDEN, "Invalid signature").into_response();
        }
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "malformed webhook payload");
            return (StatusCode::BAD_REQUEST, "Invalid payload").into_response();
        }
    };

    for event in payload.entry.into_iter().flat_map(|e| e.messaging) {
        let Some(message) = event.message else {
            continue;
        };
        if message.is_echo {
            continue;
        }
        let Some(text) = message.text.filter(|t| !t.trim().is_empty()) else {
            tracing::debug!(sender = %event.sender.id, "ignoring non-text message");
            continue;
        };
        let sender = event.sender.id;
        tracing::info!(sender = %sender, object = %payload.object, "incoming Instagram message");

        if let Err(e) = state.messaging.mark_seen(&sender).await {
            tracing::debug!(error = %e, "failed to mark message seen");
        }

        let reply = match state
            .engine
            .handle_turn(&sender, message.mid.as_deref(), &text)
            .await
        {
            Ok(reply) => reply.text,
            Err(e) => {
                tracing::error!(error = %e, sender = %sender, "conversation processing failed");
                RETRY_LATER.to_string()
            }
        };

        if let Err(e) = state.messaging.send_message(&sender, &reply).await {
            tracing::error!(error = %e, sender = %sender, "failed to send reply");
        }
    }

    (StatusCode::OK, "EVENT_RECEIVED").into_response()
}
