//! Anthropic Messages API wire types

use serde::{Deserialize, Serialize};

use crate::conversation::Turn;
use crate::{Error, Result};

/// Request body for `POST /v1/messages`
#[derive(Debug, Serialize)]
pub struct MessageRequest<'a> {
    pub model: &'a str,
    pub max_tokens: u32,
    pub temperature: f32,
    pub system: &'a str,
    pub messages: &'a [Turn],
    pub stream: bool,
}

/// Non-streaming response body
#[derive(Debug, Deserialize)]
pub struct MessageResponse {
    pub content: Vec<ContentBlock>,
}

impl MessageResponse {
    /// Concatenate every text block in order and trim the result
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyCompletion`] if no text is present
    pub fn text(&self) -> Result<String> {
        let text: String = self
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Other => None,
            })
            .collect();

        let text = text.trim();
        if text.is_empty() {
            return Err(Error::EmptyCompletion);
        }
        Ok(text.to_string())
    }
}

/// Typed content block; only text matters to the relay
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

/// Error envelope returned on non-2xx and in `error` stream frames
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

/// Error detail
#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(rename = "type")]
    pub type_: String,
    pub message: String,
}

impl ApiErrorDetail {
    /// `type: message` summary
    #[must_use]
    pub fn summary(&self) -> String {
        format!("{}: {}", self.type_, self.message)
    }
}

/// JSON payload of a stream frame, discriminated by its `type` field
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamPayload {
    ContentBlockDelta {
        delta: Delta,
    },
    MessageStop,
    Error {
        error: ApiErrorDetail,
    },
    #[serde(other)]
    Other,
}

/// Incremental content update
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delta {
    TextDelta {
        text: String,
    },
    #[serde(other)]
    Other,
}
