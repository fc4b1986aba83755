//! Team Chat Gateway - Zoom Team Chat chatbot backed by an Anthropic model
//!
//! This library provides the event-to-completion relay:
//! - Signed webhook ingress and event validation
//! - Event dispatch by type
//! - Per-conversation history with a sliding window
//! - Buffered and streamed completions with a single compensating apology
//! - Chatbot message delivery with a cached client-credentials token
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Zoom Team Chat                      │
//! │        webhooks  │  chatbot messages API             │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Team Chat Gateway                    │
//! │  Ingress  │  Dispatcher  │  Completion  │  Delivery │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │            Anthropic Messages API                    │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod channels;
pub mod completion;
pub mod config;
pub mod conversation;
pub mod error;
pub mod events;
pub mod security;
pub mod validation;

pub use api::{ApiServer, ApiServerBuilder, ApiState};
pub use channels::{ChatDelivery, OutgoingMessage, SentMessage, ZoomChannel};
pub use completion::{CompletionClient, CompletionMode, RelayOutcome};
pub use config::Config;
pub use conversation::{ConversationKey, ConversationStore, InMemoryConversationStore, Turn};
pub use error::{Error, Result};
pub use events::{Dispatcher, ZoomEvent};
