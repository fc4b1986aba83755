//! Outbound chat delivery
//!
//! The relay only needs to post text back into a conversation, so the seam is
//! the small [`ChatDelivery`] trait. [`ZoomChannel`] is the production
//! implementation; tests substitute recording fakes.

pub mod zoom;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use zoom::{MessageQuery, TokenCache, ZoomChannel};

use crate::Result;
use crate::conversation::ConversationKey;

/// A message to send to a conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Destination conversation
    pub to: ConversationKey,

    /// Message content (plain text)
    pub content: String,

    /// Optional message ID to thread the reply under
    pub reply_to: Option<String>,
}

impl OutgoingMessage {
    /// Create a simple `text` message
    #[must_use]
    pub fn text(to: ConversationKey, content: impl Into<String>) -> Self {
        Self {
            to,
            content: content.into(),
            reply_to: None,
        }
    }

    /// Create a `reply` message, threaded when `reply_to` is present
    #[must_use]
    pub fn reply(to: ConversationKey, content: impl Into<String>, reply_to: Option<String>) -> Self {
        Self {
            to,
            content: content.into(),
            reply_to,
        }
    }
}

/// Platform acknowledgement of a delivered message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub robot_jid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_jid: Option<String>,
}

/// Something that can post a message into a chat conversation
#[async_trait]
pub trait ChatDelivery: Send + Sync {
    /// Deliver a message
    ///
    /// # Errors
    ///
    /// Returns error if credentials cannot be obtained or the platform
    /// rejects the message. Callers decide whether to retry.
    async fn send(&self, message: &OutgoingMessage) -> Result<SentMessage>;
}

/// Delivery fake that records every message
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingDelivery {
    sent: std::sync::Mutex<Vec<OutgoingMessage>>,
    fail: bool,
}

#[cfg(test)]
impl RecordingDelivery {
    /// A fake whose sends are recorded and then rejected
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl ChatDelivery for RecordingDelivery {
    async fn send(&self, message: &OutgoingMessage) -> Result<SentMessage> {
        self.sent.lock().unwrap().push(message.clone());
        if self.fail {
            return Err(crate::Error::Delivery {
                status: 500,
                body: "down".to_string(),
            });
        }
        Ok(SentMessage::default())
    }
}
