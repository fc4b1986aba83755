//! HTTP API server: webhook ingress, direct messaging and conversation admin

pub mod admin;
mod auth;
pub mod health;
pub mod messages;
pub mod webhooks;

use std::sync::Arc;

use axum::{
    Json, Router,
    http::{HeaderValue, StatusCode},
};
use secrecy::SecretString;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::channels::{ChatDelivery, ZoomChannel};
use crate::completion::{AnthropicClient, CompletionClient};
use crate::config::{Config, RelayConfig};
use crate::conversation::{ConversationStore, InMemoryConversationStore};
use crate::events::Dispatcher;
use crate::security::WebhookVerifier;
use crate::{Error, Result};

/// Shared state for all handlers
#[derive(Clone)]
pub struct ApiState {
    pub dispatcher: Dispatcher,
    pub delivery: Arc<dyn ChatDelivery>,
    pub zoom: ZoomChannel,
    pub verifier: WebhookVerifier,
    pub api_key: Option<SecretString>,
    /// Acknowledge webhooks without waiting for the dispatch to finish
    pub detach: bool,
}

impl ApiState {
    /// Conversation history store
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        self.dispatcher.completion().store()
    }
}

/// JSON error body shared by every endpoint
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Error half of handler results
pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Build an error tuple
pub fn error_response(
    status: StatusCode,
    error: impl Into<String>,
    details: Option<serde_json::Value>,
) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            success: false,
            error: error.into(),
            details,
        }),
    )
}

/// Map a crate error onto a response
#[must_use]
pub fn api_error(error: &Error) -> ApiError {
    match error {
        Error::Validation(details) => error_response(
            StatusCode::BAD_REQUEST,
            "Validation failed",
            Some(serde_json::json!(details)),
        ),
        Error::Signature(e) => error_response(StatusCode::BAD_REQUEST, e.code(), None),
        Error::Delivery { status, body }
        | Error::Upstream {
            service: "zoom-api" | "zoom-oauth",
            status,
            body,
        } => error_response(
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
            "Zoom API error",
            Some(serde_json::Value::String(body.clone())),
        ),
        Error::Upstream { .. } => error_response(StatusCode::BAD_GATEWAY, "Upstream error", None),
        Error::Timeout(what) => error_response(
            StatusCode::GATEWAY_TIMEOUT,
            "Upstream timeout",
            Some(serde_json::Value::String(what.clone())),
        ),
        Error::AuthConfig(_) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Credentials not configured",
            None,
        ),
        _ => error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None),
    }
}

/// Builder for [`ApiServer`]
pub struct ApiServerBuilder {
    zoom: ZoomChannel,
    anthropic: AnthropicClient,
    verifier: WebhookVerifier,
    store: Option<Arc<dyn ConversationStore>>,
    delivery: Option<Arc<dyn ChatDelivery>>,
    api_key: Option<SecretString>,
    port: u16,
    frontend_origin: Option<String>,
    relay: RelayConfig,
}

impl ApiServerBuilder {
    /// Start from loaded configuration
    ///
    /// # Errors
    ///
    /// Returns error if an HTTP client or the webhook verifier cannot be built
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            zoom: ZoomChannel::new(&config.zoom, config.relay.request_timeout)?,
            anthropic: AnthropicClient::new(&config.anthropic, config.relay.request_timeout)?,
            verifier: WebhookVerifier::new(&config.zoom.webhook_secret)?,
            store: None,
            delivery: None,
            api_key: config.api_server.api_key.clone(),
            port: config.api_server.port,
            frontend_origin: config.api_server.frontend_origin.clone(),
            relay: config.relay.clone(),
        })
    }

    /// Use a specific conversation store (in-memory by default)
    #[must_use]
    pub fn store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a specific outbound delivery (the Zoom channel by default)
    #[must_use]
    pub fn delivery(mut self, delivery: Arc<dyn ChatDelivery>) -> Self {
        self.delivery = Some(delivery);
        self
    }

    #[must_use]
    pub fn api_key(mut self, key: Option<SecretString>) -> Self {
        self.api_key = key;
        self
    }

    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn relay(mut self, relay: RelayConfig) -> Self {
        self.relay = relay;
        self
    }

    /// Build the API server
    #[must_use]
    pub fn build(self) -> ApiServer {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryConversationStore::new()));
        let delivery: Arc<dyn ChatDelivery> = self
            .delivery
            .unwrap_or_else(|| Arc::new(self.zoom.clone()));

        let completion = Arc::new(CompletionClient::new(
            self.anthropic,
            store,
            delivery.clone(),
            self.relay.stream_idle_timeout,
        ));
        let dispatcher = Dispatcher::new(completion, delivery.clone(), self.relay.stream);

        let state = Arc::new(ApiState {
            dispatcher,
            delivery,
            zoom: self.zoom,
            verifier: self.verifier,
            api_key: self.api_key,
            detach: self.relay.detach,
        });

        ApiServer {
            state,
            port: self.port,
            frontend_origin: self.frontend_origin,
        }
    }
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
    frontend_origin: Option<String>,
}

impl ApiServer {
    /// Shared handler state
    #[must_use]
    pub const fn state(&self) -> &Arc<ApiState> {
        &self.state
    }

    /// Build the router with all routes
    #[must_use]
    pub fn router(&self) -> Router {
        let router = Router::new()
            .nest("/webhooks", webhooks::router(self.state.clone()))
            .nest(
                "/api",
                messages::router(self.state.clone()).merge(admin::router(self.state.clone())),
            )
            .merge(health::router())
            .fallback(not_found);

        router.layer(self.cors()).layer(TraceLayer::new_for_http())
    }

    fn cors(&self) -> CorsLayer {
        let origin = match self.frontend_origin.as_deref().map(HeaderValue::from_str) {
            Some(Ok(origin)) => AllowOrigin::exact(origin),
            Some(Err(e)) => {
                tracing::warn!(error = %e, "invalid FRONTEND_ORIGIN, allowing any origin");
                AllowOrigin::any()
            }
            None => AllowOrigin::any(),
        };

        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any)
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        if self.state.api_key.is_none() {
            tracing::warn!("TEAMCHAT_API_KEY not set, management API is unauthenticated");
        }

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr).await?;

        tracing::info!(port = self.port, detach = self.state.detach, "API server listening");

        axum::serve(listener, self.router()).await?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

async fn not_found() -> ApiError {
    error_response(StatusCode::NOT_FOUND, "Not found", None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SignatureError;

    #[test]
    fn test_error_mapping() {
        let (status, Json(body)) = api_error(&Error::Validation(vec!["x".into()]));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "Validation failed");
        assert_eq!(body.details, Some(serde_json::json!(["x"])));

        let (status, Json(body)) = api_error(&Error::Signature(SignatureError::Invalid));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "invalid_signature");

        let (status, Json(body)) = api_error(&Error::Delivery {
            status: 404,
            body: "No such user".into(),
        });
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "Zoom API error");

        let (status, _) = api_error(&Error::Timeout("zoom".into()));
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);

        let (status, _) = api_error(&Error::EmptyCompletion);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
