//! Chatbot access token via the OAuth client credentials grant

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{Error, Result};

/// Refresh this long before the reported expiry
const REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// Longest lifetime trusted from the token endpoint
const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Cached token info
struct TokenInfo {
    access_token: String,
    expires_at: Instant,
}

/// OAuth token response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// OAuth error body (`{"reason": "...", "error": "..."}`)
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: Option<String>,
    reason: Option<String>,
}

/// Expiry-aware cache for the chatbot bearer token
///
/// The lock is held across the refresh request, so concurrent callers that
/// find the cache stale wait for a single exchange instead of each hitting
/// the token endpoint.
#[derive(Clone)]
pub struct TokenCache {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: SecretString,
    token: Arc<Mutex<Option<TokenInfo>>>,
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl TokenCache {
    /// Create a token cache for the given client credentials
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: SecretString,
    ) -> Self {
        Self {
            client,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret,
            token: Arc::new(Mutex::new(None)),
        }
    }

    /// Get a valid access token, exchanging credentials if the cached one is
    /// missing or about to expire
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthConfig`] if client credentials are empty, or an
    /// upstream error carrying the provider's error code on non-2xx
    pub async fn get_token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;

        if let Some(info) = guard.as_ref() {
            if info.expires_at > Instant::now() + REFRESH_MARGIN {
                return Ok(info.access_token.clone());
            }
        }

        let fresh = self.request_token().await?;
        let access_token = fresh.access_token.clone();
        *guard = Some(fresh);
        drop(guard);

        Ok(access_token)
    }

    /// Drop the cached token so the next call performs a fresh exchange
    pub async fn invalidate(&self) {
        *self.token.lock().await = None;
    }

    async fn request_token(&self) -> Result<TokenInfo> {
        if self.client_id.is_empty() || self.client_secret.expose_secret().is_empty() {
            return Err(Error::AuthConfig(
                "ZOOM_CLIENT_ID and ZOOM_CLIENT_SECRET are required".to_string(),
            ));
        }

        let response = self
            .client
            .post(&self.token_url)
            .header("authorization", basic_auth_header(&self.client_id, &self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout("zoom token request".to_string())
                } else {
                    Error::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reported = serde_json::from_str::<TokenErrorResponse>(&body)
                .ok()
                .and_then(|e| e.error.or(e.reason))
                .unwrap_or(body);
            tracing::error!(status = %status, error = %reported, "zoom token request failed");
            return Err(Error::Upstream {
                service: "zoom-oauth",
                status: status.as_u16(),
                body: reported,
            });
        }

        let token: TokenResponse = response.json().await?;
        let expires_in = Duration::from_secs(token.expires_in.unwrap_or(0)).min(MAX_TOKEN_LIFETIME);

        tracing::debug!(expires_in_secs = expires_in.as_secs(), "received zoom chatbot token");

        Ok(TokenInfo {
            access_token: token.access_token,
            expires_at: Instant::now() + expires_in,
        })
    }
}

/// Build the `Basic base64(id:secret)` authorization header value
#[must_use]
pub fn basic_auth_header(client_id: &str, client_secret: &SecretString) -> String {
    let credentials = format!("{client_id}:{}", client_secret.expose_secret());
    format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode(credentials)
    )
}
