//! Conversation admin endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    middleware,
    routing::get,
};
use serde::Serialize;

use super::{ApiError, ApiState, api_error, auth::require_api_key};
use crate::conversation::{ConversationKey, MAX_HISTORY_TURNS, Turn};

#[derive(Serialize)]
pub struct ConversationResponse {
    pub jid: String,
    pub turns: Vec<Turn>,
    pub count: usize,
    pub max_turns: usize,
}

#[derive(Serialize)]
pub struct ClearResponse {
    pub success: bool,
    pub jid: String,
    pub cleared: bool,
}

/// Show the history window the LLM sees for a conversation
async fn get_conversation(
    State(state): State<Arc<ApiState>>,
    Path(jid): Path<String>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let key = ConversationKey::from(jid);
    let turns = state.store().history(&key).await.map_err(|e| api_error(&e))?;

    Ok(Json(ConversationResponse {
        count: turns.len(),
        jid: key.to_string(),
        turns,
        max_turns: MAX_HISTORY_TURNS,
    }))
}

/// Forget a conversation
async fn clear_conversation(
    State(state): State<Arc<ApiState>>,
    Path(jid): Path<String>,
) -> Result<Json<ClearResponse>, ApiError> {
    let key = ConversationKey::from(jid);
    let cleared = state.store().clear(&key).await.map_err(|e| api_error(&e))?;

    tracing::info!(to_jid = %key, cleared, "conversation cleared via admin API");

    Ok(Json(ClearResponse {
        success: true,
        jid: key.to_string(),
        cleared,
    }))
}

/// Build admin router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route(
            "/conversations/{jid}",
            get(get_conversation).delete(clear_conversation),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .with_state(state)
}
