//! Zoom Team Chat channel adapter using the chatbot messages API
//!
//! Uses the OAuth 2.0 client credentials flow for authentication

mod token;
mod types;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

pub use token::{TokenCache, basic_auth_header};
use types::{ApiErrorResponse, CardBodyItem, CardContent, CardHead, ChatbotMessage, HeadStyle};

use super::{ChatDelivery, OutgoingMessage, SentMessage};
use crate::config::ZoomConfig;
use crate::{Error, Result};

/// Query for `GET /im/chat/messages`
#[derive(Debug, Clone, Serialize)]
pub struct MessageQuery {
    pub to_jid: String,
    pub page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

impl MessageQuery {
    /// First page of up to ten messages for a conversation
    #[must_use]
    pub fn new(to_jid: impl Into<String>) -> Self {
        Self {
            to_jid: to_jid.into(),
            page_size: 10,
            next_page_token: None,
        }
    }
}

/// Zoom Team Chat channel adapter
#[derive(Debug, Clone)]
pub struct ZoomChannel {
    client: reqwest::Client,
    tokens: TokenCache,
    api_base_url: String,
    bot_jid: String,
    account_id: String,
    card_title: String,
}

impl ZoomChannel {
    /// Create a Zoom channel adapter
    ///
    /// `timeout` bounds every outbound call, including the token exchange.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &ZoomConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build Zoom HTTP client: {e}")))?;

        let tokens = TokenCache::new(
            client.clone(),
            config.oauth_token_url.clone(),
            config.client_id.clone(),
            config.client_secret.clone(),
        );

        Ok(Self {
            client,
            tokens,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            bot_jid: config.bot_jid.clone(),
            account_id: config.account_id.clone(),
            card_title: config.card_title.clone(),
        })
    }

    /// Get bot JID
    #[must_use]
    pub fn bot_jid(&self) -> &str {
        &self.bot_jid
    }

    /// Token cache used for outbound calls
    #[must_use]
    pub const fn tokens(&self) -> &TokenCache {
        &self.tokens
    }

    /// Send a chatbot card message
    ///
    /// # Errors
    ///
    /// Returns error if token retrieval fails or Zoom returns a non-2xx status
    pub async fn send_message(
        &self,
        to_jid: &str,
        text: &str,
        reply_to: Option<&str>,
    ) -> Result<SentMessage> {
        let access_token = self.tokens.get_token().await?;
        let body = self.build_message(to_jid, text, reply_to);

        tracing::debug!(to_jid = %to_jid, threaded = reply_to.is_some(), "sending Zoom chat message");

        let response = self
            .client
            .post(format!("{}/im/chat/messages", self.api_base_url))
            .bearer_auth(&access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("Zoom send", e))?;

        let status = response.status();
        let raw = response.text().await.unwrap_or_default();

        if !status.is_success() {
            if status == reqwest::StatusCode::UNAUTHORIZED {
                // Token revoked or rotated; next call exchanges again
                self.tokens.invalidate().await;
            }
            let body = describe_api_error(&raw);
            tracing::error!(to_jid = %to_jid, status = %status, error = %body, "Zoom send failed");
            return Err(Error::Delivery {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(to_jid = %to_jid, "Zoom message sent");

        if raw.trim().is_empty() {
            return Ok(SentMessage::default());
        }
        Ok(serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "unexpected Zoom send response body");
            SentMessage::default()
        }))
    }

    /// Fetch a page of chat messages for a conversation
    ///
    /// # Errors
    ///
    /// Returns error if token retrieval fails or Zoom returns a non-2xx status
    pub async fn list_messages(&self, query: &MessageQuery) -> Result<serde_json::Value> {
        let access_token = self.tokens.get_token().await?;

        let response = self
            .client
            .get(format!("{}/im/chat/messages", self.api_base_url))
            .bearer_auth(&access_token)
            .query(query)
            .send()
            .await
            .map_err(|e| transport_error("Zoom history", e))?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            return Err(Error::Upstream {
                service: "zoom-api",
                status: status.as_u16(),
                body: describe_api_error(&raw),
            });
        }

        Ok(response.json().await?)
    }

    fn build_message<'a>(
        &'a self,
        to_jid: &'a str,
        text: &'a str,
        reply_to: Option<&'a str>,
    ) -> ChatbotMessage<'a> {
        ChatbotMessage {
            robot_jid: &self.bot_jid,
            to_jid,
            user_jid: to_jid,
            account_id: &self.account_id,
            content: CardContent {
                head: CardHead {
                    text: &self.card_title,
                    style: HeadStyle { bold: true },
                },
                body: vec![CardBodyItem::Message { text }],
            },
            reply_to,
        }
    }
}

/// Prefer Zoom's `message` field, fall back to the raw body
fn describe_api_error(raw: &str) -> String {
    serde_json::from_str::<ApiErrorResponse>(raw)
        .ok()
        .and_then(|e| e.message)
        .unwrap_or_else(|| raw.to_string())
}

fn transport_error(what: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(what.to_string())
    } else {
        Error::Http(e)
    }
}

#[async_trait]
impl ChatDelivery for ZoomChannel {
    async fn send(&self, message: &OutgoingMessage) -> Result<SentMessage> {
        self.send_message(
            message.to.as_str(),
            &message.content,
            message.reply_to.as_deref(),
        )
        .await
    }
}
