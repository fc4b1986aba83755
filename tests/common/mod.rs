//! Shared test utilities

#![allow(dead_code)]

use std::collections::HashMap;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use secrecy::SecretString;
use teamchat_gateway::security::{SIGNATURE_HEADER, TIMESTAMP_HEADER, WebhookVerifier};
use teamchat_gateway::{ApiServer, ApiServerBuilder, Config};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const WEBHOOK_SECRET: &str = "whsec-test";
pub const TIMESTAMP: &str = "1700000000";

/// Zoom and Anthropic doubles behind one mock server
pub struct Upstreams {
    pub server: MockServer,
}

impl Upstreams {
    pub async fn start() -> Self {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "bot-token",
                "expires_in": 3600
            })))
            .mount(&server)
            .await;

        Self { server }
    }

    /// Accept every chatbot message
    pub async fn zoom_accepts(&self) {
        Mock::given(method("POST"))
            .and(path("/v2/im/chat/messages"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "message_id": "m-100",
                "robot_jid": "robot@xmpp.zoom.us",
                "to_jid": "u1@x"
            })))
            .mount(&self.server)
            .await;
    }

    /// Reject every chatbot message
    pub async fn zoom_rejects(&self, status: u16, message: &str) {
        Mock::given(method("POST"))
            .and(path("/v2/im/chat/messages"))
            .respond_with(ResponseTemplate::new(status).set_body_json(serde_json::json!({
                "code": 7001,
                "message": message
            })))
            .mount(&self.server)
            .await;
    }

    /// Answer every completion with `text`
    pub async fn anthropic_answers(&self, text: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "msg_1",
                "type": "message",
                "role": "assistant",
                "content": [{"type": "text", "text": text}],
                "stop_reason": "end_turn"
            })))
            .mount(&self.server)
            .await;
    }

    /// Stream every completion as `text/event-stream` deltas
    pub async fn anthropic_streams(&self, deltas: &[&str]) {
        let mut body = String::from(
            "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{}}\n\n",
        );
        for text in deltas {
            let frame = serde_json::json!({
                "type": "content_block_delta",
                "index": 0,
                "delta": {"type": "text_delta", "text": text}
            });
            body.push_str(&format!("event: content_block_delta\ndata: {frame}\n\n"));
        }
        body.push_str("event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n");

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(body_partial_json(serde_json::json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&self.server)
            .await;
    }

    /// Wait until Zoom has received `count` chatbot messages
    pub async fn wait_for_zoom_messages(&self, count: usize) -> Vec<serde_json::Value> {
        for _ in 0..100 {
            let sent = self.zoom_messages().await;
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.zoom_messages().await
    }

    /// Fail every completion with `status`
    pub async fn anthropic_fails(&self, status: u16) {
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(status).set_body_json(serde_json::json!({
                "type": "error",
                "error": {"type": "api_error", "message": "overloaded"}
            })))
            .mount(&self.server)
            .await;
    }

    /// Bodies of every chatbot message Zoom received
    pub async fn zoom_messages(&self) -> Vec<serde_json::Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == "/v2/im/chat/messages" && r.method.as_str() == "POST")
            .map(|r| serde_json::from_slice(&r.body).expect("zoom request body is JSON"))
            .collect()
    }

    /// Configuration pointing every upstream at the mock server
    pub fn config(&self, extra: &[(&'static str, &str)]) -> Config {
        let uri = self.server.uri();
        let mut env: HashMap<&str, String> = HashMap::from([
            ("ZOOM_CLIENT_ID", "client".to_string()),
            ("ZOOM_CLIENT_SECRET", "secret".to_string()),
            ("ZOOM_BOT_JID", "robot@xmpp.zoom.us".to_string()),
            ("ZOOM_WEBHOOK_SECRET_TOKEN", WEBHOOK_SECRET.to_string()),
            ("ANTHROPIC_API_KEY", "sk-ant-test".to_string()),
            ("ZOOM_API_BASE_URL", format!("{uri}/v2")),
            ("ZOOM_OAUTH_TOKEN_URL", format!("{uri}/oauth/token")),
            ("ANTHROPIC_BASE_URL", uri),
            ("TEAMCHAT_STREAM", "false".to_string()),
            ("TEAMCHAT_DETACH_RELAY", "false".to_string()),
            ("TEAMCHAT_REQUEST_TIMEOUT_SECS", "5".to_string()),
        ]);
        for (key, value) in extra {
            env.insert(key, (*value).to_string());
        }

        Config::from_lookup(|key| env.get(key).cloned()).expect("test config is valid")
    }

    /// Builder wired to the mock upstreams
    pub fn builder(&self, extra: &[(&'static str, &str)]) -> ApiServerBuilder {
        ApiServerBuilder::from_config(&self.config(extra)).expect("failed to build test server")
    }

    /// Build a server wired to the mock upstreams
    pub fn server(&self, extra: &[(&'static str, &str)]) -> ApiServer {
        self.builder(extra).build()
    }
}

/// Webhook request signed the way Zoom signs deliveries
pub fn signed_webhook(body: &serde_json::Value) -> Request<Body> {
    let raw = serde_json::to_vec(body).expect("serializable body");
    let verifier = WebhookVerifier::new(&SecretString::from(WEBHOOK_SECRET.to_string()))
        .expect("verifier");
    let signature = verifier.sign(TIMESTAMP, &raw);

    Request::builder()
        .method("POST")
        .uri("/webhooks")
        .header("content-type", "application/json")
        .header(SIGNATURE_HEADER, signature)
        .header(TIMESTAMP_HEADER, TIMESTAMP)
        .body(Body::from(raw))
        .expect("request")
}

/// JSON request without any signature
pub fn json_request(method: &str, uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).expect("serializable body")))
        .expect("request")
}

/// Bodyless GET
pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

/// Collect a response body as JSON
pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body");
    serde_json::from_slice(&bytes).expect("JSON body")
}

pub fn router(server: &ApiServer) -> Router {
    server.router()
}
