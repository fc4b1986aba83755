//! Request authentication for webhook deliveries and the management API

pub mod signature;

pub use signature::{SIGNATURE_HEADER, TIMESTAMP_HEADER, WebhookVerifier, constant_time_eq};
