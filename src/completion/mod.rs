//! Completion client: turns a user prompt into an assistant reply
//!
//! One call to [`CompletionClient::complete`] appends the user turn, asks the
//! provider for a completion over the whole history window, records the
//! assistant turn and delivers the text back to the conversation. Any failure
//! before delivery is compensated with a single apology message, so the chat
//! user always sees exactly one outcome.
//!
//! Calls for the same conversation are serialized so turns never interleave.

mod anthropic;
pub mod sse;
mod types;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::StreamExt;
use tokio::sync::Mutex;

pub use anthropic::AnthropicClient;
pub use sse::DeltaStream;
pub use types::{MessageRequest, MessageResponse};

use crate::channels::{ChatDelivery, OutgoingMessage};
use crate::conversation::{ConversationKey, ConversationStore, Turn};
use crate::{Error, Result};

/// Fixed system instruction
pub const SYSTEM_PROMPT: &str = "You are a helpful AI assistant integrated with Zoom Team Chat. Provide concise, helpful responses to user questions and requests.";

/// Completion length cap
pub const MAX_TOKENS: u32 = 1000;

/// Sampling temperature
pub const TEMPERATURE: f32 = 0.7;

/// Sent in place of an answer when the completion fails
pub const APOLOGY_MESSAGE: &str = "Sorry, I hit an AI model error. I will be back shortly.";

/// Observer for streamed text: `(delta, text so far)`
pub type ChunkCallback = Box<dyn FnMut(&str, &str) + Send>;

/// How the provider is asked for the completion
pub enum CompletionMode {
    /// Single JSON response
    Buffered,
    /// Server-sent events, optionally observed chunk by chunk
    Streaming { on_chunk: Option<ChunkCallback> },
}

impl CompletionMode {
    /// Streaming without an observer when `stream` is set, buffered otherwise
    #[must_use]
    pub fn from_flag(stream: bool) -> Self {
        if stream {
            Self::Streaming { on_chunk: None }
        } else {
            Self::Buffered
        }
    }

    const fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming { .. })
    }
}

impl fmt::Debug for CompletionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffered => f.write_str("Buffered"),
            Self::Streaming { on_chunk } => f
                .debug_struct("Streaming")
                .field("on_chunk", &on_chunk.is_some())
                .finish(),
        }
    }
}

/// What the chat user ended up seeing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Completion succeeded; `delivered` is false if posting it failed
    Answered { text: String, delivered: bool },
    /// Completion failed and the apology was attempted
    Apologized { delivered: bool },
    /// Nothing to do (blank conversation key)
    Skipped,
}

impl RelayOutcome {
    /// Final assistant text, if the completion succeeded
    #[must_use]
    pub fn final_text(&self) -> Option<&str> {
        match self {
            Self::Answered { text, .. } => Some(text),
            _ => None,
        }
    }
}

/// Orchestrates history, provider calls and delivery
pub struct CompletionClient {
    provider: AnthropicClient,
    store: Arc<dyn ConversationStore>,
    delivery: Arc<dyn ChatDelivery>,
    turn_locks: DashMap<ConversationKey, Arc<Mutex<()>>>,
    stream_idle_timeout: Duration,
}

impl fmt::Debug for CompletionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionClient")
            .field("provider", &self.provider)
            .field("stream_idle_timeout", &self.stream_idle_timeout)
            .finish_non_exhaustive()
    }
}

impl CompletionClient {
    /// Create a completion client
    #[must_use]
    pub fn new(
        provider: AnthropicClient,
        store: Arc<dyn ConversationStore>,
        delivery: Arc<dyn ChatDelivery>,
        stream_idle_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            store,
            delivery,
            turn_locks: DashMap::new(),
            stream_idle_timeout,
        }
    }

    /// Conversation store backing this client
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    /// Generate a reply to `prompt` and deliver it to `to`
    ///
    /// Never fails: provider and store errors are answered with
    /// [`APOLOGY_MESSAGE`], and delivery errors are logged.
    pub async fn complete(
        &self,
        to: &ConversationKey,
        prompt: &str,
        reply_to: Option<&str>,
        mode: CompletionMode,
    ) -> RelayOutcome {
        if to.is_empty() {
            tracing::warn!("completion requested without a conversation key");
            return RelayOutcome::Skipped;
        }

        let lock = self.turn_lock(to);
        let _turn = lock.lock().await;

        let streaming = mode.is_streaming();
        match self.generate(to, prompt, mode).await {
            Ok(text) => {
                tracing::info!(to_jid = %to, streaming, chars = text.chars().count(), "completion ready");
                let message = OutgoingMessage::reply(to.clone(), text.clone(), reply_to.map(str::to_string));
                let delivered = match self.delivery.send(&message).await {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::error!(to_jid = %to, error = %e, "failed to deliver completion");
                        false
                    }
                };
                RelayOutcome::Answered { text, delivered }
            }
            Err(e) => {
                log_failure(to, &e);
                let delivered = self.send_apology(to, reply_to).await;
                RelayOutcome::Apologized { delivered }
            }
        }
    }

    /// Run one turn against the provider without delivering anything
    ///
    /// The user turn stays in history even if the provider call fails.
    ///
    /// # Errors
    ///
    /// Returns error if the store, the provider call, or stream decoding fails,
    /// or if the completion is empty
    pub async fn generate(
        &self,
        key: &ConversationKey,
        prompt: &str,
        mode: CompletionMode,
    ) -> Result<String> {
        let history = self.store.append(key, Turn::user(prompt)).await?;

        let request = MessageRequest {
            model: self.provider.model(),
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            system: SYSTEM_PROMPT,
            messages: &history,
            stream: mode.is_streaming(),
        };

        tracing::debug!(to_jid = %key, turns = history.len(), stream = request.stream, "requesting completion");

        let text = match mode {
            CompletionMode::Buffered => self.provider.complete_message(&request).await?.text()?,
            CompletionMode::Streaming { on_chunk } => {
                let deltas = self.provider.stream_message(&request).await?;
                collect_deltas(deltas, self.stream_idle_timeout, on_chunk).await?
            }
        };

        self.store.append(key, Turn::assistant(text.clone())).await?;
        Ok(text)
    }

    async fn send_apology(&self, to: &ConversationKey, reply_to: Option<&str>) -> bool {
        let message = OutgoingMessage::reply(to.clone(), APOLOGY_MESSAGE, reply_to.map(str::to_string));
        match self.delivery.send(&message).await {
            Ok(_) => {
                tracing::info!(to_jid = %to, "apology delivered");
                true
            }
            Err(e) => {
                tracing::error!(to_jid = %to, error = %e, "failed to deliver apology");
                false
            }
        }
    }

    fn turn_lock(&self, key: &ConversationKey) -> Arc<Mutex<()>> {
        self.turn_locks.entry(key.clone()).or_default().clone()
    }
}

/// Drain a delta stream into the final text
///
/// Each read must arrive within `idle_timeout`. The result is trimmed; an
/// empty result is [`Error::EmptyCompletion`].
///
/// # Errors
///
/// Returns the first stream error, [`Error::Timeout`] on a stalled stream, or
/// [`Error::EmptyCompletion`]
pub async fn collect_deltas(
    mut deltas: DeltaStream,
    idle_timeout: Duration,
    mut on_chunk: Option<ChunkCallback>,
) -> Result<String> {
    let mut text = String::new();

    loop {
        let next = tokio::time::timeout(idle_timeout, deltas.next())
            .await
            .map_err(|_| Error::Timeout("completion stream stalled".to_string()))?;
        let Some(delta) = next else {
            break;
        };
        let delta = delta?;
        text.push_str(&delta);
        if let Some(callback) = on_chunk.as_mut() {
            callback(&delta, &text);
        }
    }

    let text = text.trim();
    if text.is_empty() {
        return Err(Error::EmptyCompletion);
    }
    Ok(text.to_string())
}

fn log_failure(to: &ConversationKey, error: &Error) {
    let hint = match error {
        Error::Upstream {
            service: "anthropic",
            status,
            ..
        } => match status {
            401 => Some("authentication failed, check ANTHROPIC_API_KEY"),
            429 => Some("rate limited by the provider"),
            400 => Some("request rejected, check model and payload"),
            404 => Some("model not found, check ANTHROPIC_MODEL"),
            _ => None,
        },
        _ => None,
    };

    match hint {
        Some(hint) => tracing::error!(to_jid = %to, error = %error, hint, "completion failed"),
        None => tracing::error!(to_jid = %to, error = %error, "completion failed"),
    }
}
