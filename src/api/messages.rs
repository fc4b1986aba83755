//! Direct messaging endpoints
//!
//! Server-to-server calls that post into, or read from, a Team Chat
//! conversation without going through the LLM.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    middleware,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiState, api_error, auth::require_api_key};
use crate::channels::{MessageQuery, OutgoingMessage, SentMessage};
use crate::Error;
use crate::validation::DirectSendPayload;

/// Successful direct send
#[derive(Serialize)]
pub struct SendResponse {
    pub success: bool,
    pub message: &'static str,
    pub data: SentMessage,
}

/// Query for `GET /api/messages`
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub to_jid: Option<String>,
    pub page_size: Option<u32>,
    pub next_page_token: Option<String>,
}

/// Page of chat messages as returned by Zoom
#[derive(Serialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub data: serde_json::Value,
}

/// Send a message to a user or channel
async fn send_message(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<Json<SendResponse>, ApiError> {
    let payload: DirectSendPayload = serde_json::from_slice(&body).map_err(|e| {
        api_error(&Error::Validation(vec![format!("Invalid JSON body: {e}")]))
    })?;
    let send = payload.validate().map_err(|e| api_error(&e))?;

    let message = OutgoingMessage::reply(send.to_jid, send.message, send.reply_to);
    let data = state.delivery.send(&message).await.map_err(|e| {
        tracing::error!(to_jid = %message.to, error = %e, "direct send failed");
        api_error(&e)
    })?;

    tracing::info!(to_jid = %message.to, "direct message sent");

    Ok(Json(SendResponse {
        success: true,
        message: "Message sent successfully!",
        data,
    }))
}

/// Fetch a page of a conversation's chat history
async fn list_messages(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let Some(to_jid) = params.to_jid.filter(|j| !j.trim().is_empty()) else {
        return Err(api_error(&Error::Validation(vec![
            "to_jid is required and must be a string".to_string(),
        ])));
    };

    let mut query = MessageQuery::new(to_jid);
    if let Some(page_size) = params.page_size {
        query.page_size = page_size;
    }
    query.next_page_token = params.next_page_token;

    let data = state.zoom.list_messages(&query).await.map_err(|e| {
        tracing::error!(to_jid = %query.to_jid, error = %e, "history fetch failed");
        api_error(&e)
    })?;

    Ok(Json(HistoryResponse {
        success: true,
        data,
    }))
}

/// Build messaging router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/message", post(send_message))
        .route("/messages", get(list_messages))
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .with_state(state)
}
