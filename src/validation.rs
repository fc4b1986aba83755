//! Direct-send payload validation and message sanitizing

use serde::Deserialize;
use serde_json::Value;

use crate::conversation::{ConversationKey, is_valid_jid};
use crate::{Error, Result};

/// Longest message the chat platform accepts, in characters
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Untyped `POST /api/message` body, so each field can be reported on
#[derive(Debug, Default, Deserialize)]
pub struct DirectSendPayload {
    #[serde(default)]
    pub to_jid: Value,
    #[serde(default)]
    pub message: Value,
    #[serde(default)]
    pub reply_to: Value,
}

/// A validated direct send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectSend {
    pub to_jid: ConversationKey,
    /// Sanitized text
    pub message: String,
    pub reply_to: Option<String>,
}

impl DirectSendPayload {
    /// Check field types and limits, then sanitize the message
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] listing every problem found
    pub fn validate(self) -> Result<DirectSend> {
        let mut errors = Vec::new();

        let to_jid = match self.to_jid {
            Value::String(jid) if !jid.trim().is_empty() => Some(jid),
            _ => {
                errors.push("to_jid is required and must be a string".to_string());
                None
            }
        };

        let message = match self.message {
            Value::String(message) if !message.is_empty() => {
                if message.chars().count() > MAX_MESSAGE_CHARS {
                    errors.push(format!(
                        "message must be {MAX_MESSAGE_CHARS} characters or less"
                    ));
                }
                Some(message)
            }
            _ => {
                errors.push("message is required and must be a string".to_string());
                None
            }
        };

        let reply_to = match self.reply_to {
            Value::Null => None,
            Value::String(id) => Some(id).filter(|id| !id.is_empty()),
            _ => {
                errors.push("reply_to must be a string if provided".to_string());
                None
            }
        };

        let (Some(to_jid), Some(message), true) = (to_jid, message, errors.is_empty()) else {
            return Err(Error::Validation(errors));
        };

        if !is_valid_jid(&to_jid) {
            tracing::warn!(to_jid = %to_jid, "to_jid does not look like a JID");
        }

        Ok(DirectSend {
            to_jid: ConversationKey::from(to_jid),
            message: sanitize_message(&message),
            reply_to,
        })
    }
}

/// Trim, drop ASCII control characters and cap at [`MAX_MESSAGE_CHARS`]
#[must_use]
pub fn sanitize_message(message: &str) -> String {
    message
        .trim()
        .chars()
        .filter(|c| !c.is_ascii_control())
        .take(MAX_MESSAGE_CHARS)
        .collect()
}
