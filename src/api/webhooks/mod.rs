//! Webhook endpoints for the Zoom Team Chat integration

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use super::{ApiState, health};

pub mod zoom;

/// Build webhooks router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", post(zoom::handle_event))
        .route("/health", get(health::webhook_health))
        .with_state(state)
}
