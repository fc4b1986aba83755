//! Per-conversation message history used as LLM context
//!
//! History is keyed by the Zoom JID of the conversation partner and kept as a
//! sliding window of the most recent [`MAX_HISTORY_TURNS`] turns.

mod memory;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use memory::InMemoryConversationStore;

use crate::Result;

/// Maximum number of turns retained per conversation
pub const MAX_HISTORY_TURNS: usize = 20;

/// Identifier of a chat participant or channel (`local@domain`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationKey(String);

impl ConversationKey {
    /// Wrap a raw JID
    #[must_use]
    pub fn new(jid: impl Into<String>) -> Self {
        Self(jid.into())
    }

    /// Borrow the raw JID
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the key is blank
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Whether the key has the `local@domain` shape
    #[must_use]
    pub fn is_jid(&self) -> bool {
        is_valid_jid(&self.0)
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ConversationKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Check a JID for the `local@domain` shape
///
/// Exactly one `@`, non-empty halves, no whitespace.
#[must_use]
pub fn is_valid_jid(jid: &str) -> bool {
    let Some((local, domain)) = jid.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && !jid.chars().any(char::is_whitespace)
}

/// Author of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    /// A turn written by the chat user
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// A turn written by the assistant
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Storage for conversation history
///
/// Implementations must be safe under concurrent use across keys; each
/// operation on a single key is atomic.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Current history for `key`, oldest first (empty if unknown)
    async fn history(&self, key: &ConversationKey) -> Result<Vec<Turn>>;

    /// Append a turn, drop the oldest turns beyond the cap, and return the
    /// resulting window
    async fn append(&self, key: &ConversationKey, turn: Turn) -> Result<Vec<Turn>>;

    /// Keep only the most recent `max_turns` turns
    async fn trim(&self, key: &ConversationKey, max_turns: usize) -> Result<()>;

    /// Forget a conversation; returns whether anything was stored
    async fn clear(&self, key: &ConversationKey) -> Result<bool>;
}
