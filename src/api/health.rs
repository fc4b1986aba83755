//! Health check endpoints

use axum::{Json, Router, routing::get};
use chrono::Utc;
use serde::Serialize;

/// Liveness response for `/health`
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub timestamp: String,
}

/// Liveness response for `/webhooks/health`
#[derive(Serialize)]
pub struct WebhookHealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub service: &'static str,
}

/// Gateway liveness
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Static webhook receiver liveness
pub async fn webhook_health() -> Json<WebhookHealthResponse> {
    Json(WebhookHealthResponse {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339(),
        service: "zoom-webhook-handler",
    })
}

/// Build health check router
pub fn router() -> Router {
    Router::new().route("/health", get(health))
}
