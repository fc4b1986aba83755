//! Zoom Team Chat webhook handler
//!
//! Order of checks: parse the envelope, answer the URL validation challenge,
//! verify the signature over the raw body, validate event fields, then hand
//! the event to the dispatcher.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::api::{ApiState, api_error, error_response};
use crate::events::{WebhookEnvelope, ZoomEvent};
use crate::security::{SIGNATURE_HEADER, TIMESTAMP_HEADER};

/// Webhook acknowledgment
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub success: bool,
    pub message: &'static str,
    pub event: String,
}

/// URL validation challenge answer
#[derive(Debug, Serialize)]
pub struct ChallengeResponse {
    pub message: ChallengeToken,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeToken {
    pub plain_token: String,
    pub encrypted_token: String,
}

/// Handle an incoming webhook delivery
pub async fn handle_event(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let envelope = match WebhookEnvelope::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(error = %e, "rejected webhook body");
            return api_error(&e).into_response();
        }
    };

    if envelope.is_url_validation() {
        return match envelope.plain_token() {
            Ok(plain_token) => {
                tracing::info!("answering endpoint URL validation");
                let encrypted_token = state.verifier.encrypt_token(plain_token);
                Json(ChallengeResponse {
                    message: ChallengeToken {
                        plain_token: plain_token.to_string(),
                        encrypted_token,
                    },
                })
                .into_response()
            }
            Err(e) => api_error(&e).into_response(),
        };
    }

    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    if let Err(e) = state
        .verifier
        .verify(header(SIGNATURE_HEADER), header(TIMESTAMP_HEADER), &body)
    {
        tracing::warn!(error = %e, event = envelope.event_type().unwrap_or_default(), "webhook signature check failed");
        return error_response(StatusCode::BAD_REQUEST, e.code(), None).into_response();
    }

    let event = match ZoomEvent::try_from(&envelope) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "webhook payload failed validation");
            return api_error(&e).into_response();
        }
    };

    let name = envelope.event_type().unwrap_or_default().to_string();
    tracing::info!(event = %name, "received Zoom webhook event");

    let dispatcher = state.dispatcher.clone();
    let task = tokio::spawn(async move { dispatcher.dispatch(event).await });

    if !state.detach {
        if let Err(e) = task.await {
            tracing::error!(event = %name, error = %e, "webhook dispatch aborted");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error", None)
                .into_response();
        }
    }

    (
        StatusCode::OK,
        Json(WebhookAck {
            success: true,
            message: "Event processed successfully",
            event: name,
        }),
    )
        .into_response()
}
