//! Error types for the Team Chat gateway

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Reasons a webhook signature check can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// Signature or timestamp header absent
    #[error("missing signature headers")]
    MissingHeaders,

    /// Signature header present but does not match the body
    #[error("invalid signature")]
    Invalid,
}

impl SignatureError {
    /// Stable machine-readable code for API responses
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::MissingHeaders => "missing_signature_headers",
            Self::Invalid => "invalid_signature",
        }
    }
}

/// Errors that can occur in the gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Credentials required for an outbound call are not configured
    #[error("credentials not configured: {0}")]
    AuthConfig(String),

    /// Request payload failed validation
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// Webhook signature verification failed
    #[error("signature error: {0}")]
    Signature(#[from] SignatureError),

    /// Non-success response from an upstream API (token endpoint, LLM provider)
    #[error("{service} returned {status}: {body}")]
    Upstream {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// Chat platform rejected an outbound message
    #[error("delivery failed with {status}: {body}")]
    Delivery { status: u16, body: String },

    /// The provider answered without any text
    #[error("empty completion")]
    EmptyCompletion,

    /// An outbound call exceeded its time budget
    #[error("timed out: {0}")]
    Timeout(String),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// HTTP status reported by the upstream service, if this error carries one
    #[must_use]
    pub const fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } | Self::Delivery { status, .. } => Some(*status),
            _ => None,
        }
    }
}
