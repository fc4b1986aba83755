//! HTTP client for the Anthropic Messages API

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;

use super::sse::{DeltaStream, text_deltas};
use super::types::{ApiErrorResponse, MessageRequest, MessageResponse};
use crate::config::{ANTHROPIC_API_VERSION, AnthropicConfig};
use crate::{Error, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin client over `POST /v1/messages`
///
/// `request_timeout` bounds a whole buffered call, and only the time to
/// response headers for a streaming call. Stream reads are bounded by the
/// caller.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: reqwest::Client,
    url: String,
    model: String,
    request_timeout: Duration,
}

impl AnthropicClient {
    /// Create a client from provider settings
    ///
    /// # Errors
    ///
    /// Returns error if the API key is not a valid header value or the HTTP
    /// client cannot be built
    pub fn new(config: &AnthropicConfig, request_timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut api_key = HeaderValue::from_str(config.api_key.expose_secret())
            .map_err(|_| Error::Config("ANTHROPIC_API_KEY contains invalid characters".to_string()))?;
        api_key.set_sensitive(true);
        headers.insert("x-api-key", api_key);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_API_VERSION),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("failed to build Anthropic HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: format!("{}/v1/messages", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            request_timeout,
        })
    }

    /// Configured model identifier
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a non-streaming request and parse the full response
    ///
    /// # Errors
    ///
    /// Returns an upstream error on non-2xx, [`Error::Timeout`] when the
    /// budget is exceeded, or a serialization error on an unexpected body
    pub async fn complete_message(&self, request: &MessageRequest<'_>) -> Result<MessageResponse> {
        let call = async {
            let response = self.client.post(&self.url).json(request).send().await?;
            let response = check_status(response).await?;
            let body = response.text().await?;
            Ok::<MessageResponse, Error>(serde_json::from_str(&body)?)
        };

        tokio::time::timeout(self.request_timeout, call)
            .await
            .map_err(|_| Error::Timeout("anthropic completion".to_string()))?
    }

    /// Open a streaming request and return its text deltas
    ///
    /// # Errors
    ///
    /// Returns an upstream error on non-2xx or [`Error::Timeout`] if response
    /// headers do not arrive within the request budget
    pub async fn stream_message(&self, request: &MessageRequest<'_>) -> Result<DeltaStream> {
        let open = async {
            let response = self
                .client
                .post(&self.url)
                .header("accept", "text/event-stream")
                .json(request)
                .send()
                .await?;
            check_status(response).await
        };

        let response = tokio::time::timeout(self.request_timeout, open)
            .await
            .map_err(|_| Error::Timeout("anthropic stream open".to_string()))??;

        Ok(text_deltas(response.bytes_stream()))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let raw = response.text().await.unwrap_or_default();
    let body = serde_json::from_str::<ApiErrorResponse>(&raw)
        .map_or(raw, |e| e.error.summary());

    Err(Error::Upstream {
        service: "anthropic",
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use secrecy::SecretString;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::conversation::Turn;

    fn client(server: &MockServer, timeout: Duration) -> AnthropicClient {
        let config = AnthropicConfig {
            api_key: SecretString::from("sk-ant-test".to_string()),
            model: "claude-test".to_string(),
            base_url: server.uri(),
        };
        AnthropicClient::new(&config, timeout).unwrap()
    }

    fn request<'a>(history: &'a [Turn], stream: bool) -> MessageRequest<'a> {
        MessageRequest {
            model: "claude-test",
            max_tokens: 1000,
            temperature: 0.7,
            system: "sys",
            messages: history,
            stream,
        }
    }

    #[tokio::test]
    async fn test_buffered_request_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-ant-test"))
            .and(header("anthropic-version", "2023-06-01"))
            .and(body_partial_json(serde_json::json!({
                "model": "claude-test",
                "stream": false,
                "messages": [{"role": "user", "content": "hi"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"type": "text", "text": "Hello!"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let history = vec![Turn::user("hi")];
        let response = client(&server, Duration::from_secs(5))
            .complete_message(&request(&history, false))
            .await
            .unwrap();
        assert_eq!(response.text().unwrap(), "Hello!");
    }

    #[tokio::test]
    async fn test_non_success_carries_status_and_summary() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "type": "error",
                "error": {"type": "rate_limit_error", "message": "slow down"}
            })))
            .mount(&server)
            .await;

        let history = vec![Turn::user("hi")];
        let err = client(&server, Duration::from_secs(5))
            .complete_message(&request(&history, false))
            .await
            .unwrap_err();
        match err {
            Error::Upstream { status, body, .. } => {
                assert_eq!(status, 429);
                assert_eq!(body, "rate_limit_error: slow down");
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_buffered_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"content": []}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let history = vec![Turn::user("hi")];
        let err = client(&server, Duration::from_millis(50))
            .complete_message(&request(&history, false))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_stream_yields_deltas() {
        let server = MockServer::start().await;
        let body = concat!(
            "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{}}\n\n",
            "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi \"}}\n\n",
            "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"there\"}}\n\n",
            "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("accept", "text/event-stream"))
            .and(body_partial_json(serde_json::json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let history = vec![Turn::user("hi")];
        let deltas: Vec<String> = client(&server, Duration::from_secs(5))
            .stream_message(&request(&history, true))
            .await
            .unwrap()
            .map(Result::unwrap)
            .collect()
            .await;
        assert_eq!(deltas, vec!["Hi ", "there"]);
    }
}
