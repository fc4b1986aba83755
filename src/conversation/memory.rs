//! Process-local conversation store backed by a sharded concurrent map

use std::collections::VecDeque;

use async_trait::async_trait;
use dashmap::DashMap;

use super::{ConversationKey, ConversationStore, MAX_HISTORY_TURNS, Turn};
use crate::Result;

/// In-memory [`ConversationStore`]
///
/// Each key's window lives behind its map shard lock, so operations on
/// different keys do not contend on a single global lock. Nothing survives a
/// restart.
#[derive(Debug)]
pub struct InMemoryConversationStore {
    conversations: DashMap<ConversationKey, VecDeque<Turn>>,
    max_turns: usize,
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryConversationStore {
    /// Create a store capped at [`MAX_HISTORY_TURNS`] per conversation
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_turns(MAX_HISTORY_TURNS)
    }

    /// Create a store with a custom per-conversation cap
    #[must_use]
    pub fn with_max_turns(max_turns: usize) -> Self {
        Self {
            conversations: DashMap::new(),
            max_turns: max_turns.max(1),
        }
    }

    /// Number of conversations currently held
    #[must_use]
    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    /// Whether no conversation is held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}

fn drop_oldest(window: &mut VecDeque<Turn>, max_turns: usize) {
    while window.len() > max_turns {
        window.pop_front();
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn history(&self, key: &ConversationKey) -> Result<Vec<Turn>> {
        Ok(self
            .conversations
            .get(key)
            .map(|window| window.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn append(&self, key: &ConversationKey, turn: Turn) -> Result<Vec<Turn>> {
        let mut window = self.conversations.entry(key.clone()).or_default();
        window.push_back(turn);
        drop_oldest(&mut window, self.max_turns);
        Ok(window.iter().cloned().collect())
    }

    async fn trim(&self, key: &ConversationKey, max_turns: usize) -> Result<()> {
        if let Some(mut window) = self.conversations.get_mut(key) {
            drop_oldest(&mut window, max_turns);
        }
        Ok(())
    }

    async fn clear(&self, key: &ConversationKey) -> Result<bool> {
        let removed = self.conversations.remove(key).is_some();
        if removed {
            tracing::info!(to_jid = %key, "cleared conversation history");
        }
        Ok(removed)
    }
}
