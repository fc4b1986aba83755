//! Configuration management for the Team Chat gateway
//!
//! Everything is read from environment variables. [`Config::from_lookup`]
//! takes an arbitrary lookup function so tests can supply values without
//! touching the process environment.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::{Error, Result};

/// Default Zoom REST API base URL
pub const DEFAULT_ZOOM_API_BASE_URL: &str = "https://api.zoom.us/v2";

/// Default Zoom OAuth token endpoint
pub const DEFAULT_ZOOM_OAUTH_TOKEN_URL: &str = "https://zoom.us/oauth/token";

/// Default Anthropic API base URL
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

/// Default Anthropic model
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-latest";

/// Anthropic API version header value
pub const ANTHROPIC_API_VERSION: &str = "2023-06-01";

/// Variables that must be present for the gateway to start
const REQUIRED_VARS: [&str; 5] = [
    "ZOOM_CLIENT_ID",
    "ZOOM_CLIENT_SECRET",
    "ZOOM_BOT_JID",
    "ZOOM_WEBHOOK_SECRET_TOKEN",
    "ANTHROPIC_API_KEY",
];

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Zoom Team Chat app settings
    pub zoom: ZoomConfig,

    /// LLM provider settings
    pub anthropic: AnthropicConfig,

    /// HTTP API server configuration
    pub api_server: ApiServerConfig,

    /// Webhook-to-completion relay behaviour
    pub relay: RelayConfig,
}

/// Zoom Team Chat app settings
#[derive(Debug, Clone)]
pub struct ZoomConfig {
    /// OAuth client ID
    pub client_id: String,

    /// OAuth client secret
    pub client_secret: SecretString,

    /// Chatbot JID used as the sender of outbound messages
    pub bot_jid: String,

    /// Account ID attached to outbound messages (empty if unset)
    pub account_id: String,

    /// Secret token used to sign webhook deliveries
    pub webhook_secret: SecretString,

    /// REST API base URL
    pub api_base_url: String,

    /// OAuth token endpoint
    pub oauth_token_url: String,

    /// Headline shown on outbound message cards
    pub card_title: String,
}

/// Anthropic Messages API settings
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// API key sent as `x-api-key`
    pub api_key: SecretString,

    /// Model identifier
    pub model: String,

    /// API base URL (without `/v1/messages`)
    pub base_url: String,
}

/// HTTP API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Server-to-server token for the management API (`TEAMCHAT_API_KEY`)
    pub api_key: Option<SecretString>,

    /// Allowed CORS origin; any origin when unset
    pub frontend_origin: Option<String>,
}

/// Relay behaviour between webhook ingress and the completion client
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Use the streaming completion endpoint
    pub stream: bool,

    /// Acknowledge webhooks before the completion finishes
    pub detach: bool,

    /// Budget for a whole buffered call or for establishing a stream
    pub request_timeout: Duration,

    /// Maximum silence between two stream reads
    pub stream_idle_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            stream: true,
            detach: true,
            request_timeout: Duration::from_secs(120),
            stream_idle_timeout: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns error if a required variable is missing or a value is malformed
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    ///
    /// Empty values count as missing.
    ///
    /// # Errors
    ///
    /// Returns error listing every missing required variable, or the first
    /// malformed numeric/boolean value
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let missing: Vec<&str> = REQUIRED_VARS
            .iter()
            .copied()
            .filter(|key| get(key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        let required = |key: &str| get(key).unwrap_or_default();

        let zoom = ZoomConfig {
            client_id: required("ZOOM_CLIENT_ID"),
            client_secret: SecretString::from(required("ZOOM_CLIENT_SECRET")),
            bot_jid: required("ZOOM_BOT_JID"),
            account_id: get("ZOOM_ACCOUNT_ID").unwrap_or_default(),
            webhook_secret: SecretString::from(required("ZOOM_WEBHOOK_SECRET_TOKEN")),
            api_base_url: get("ZOOM_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_ZOOM_API_BASE_URL.to_string()),
            oauth_token_url: get("ZOOM_OAUTH_TOKEN_URL")
                .unwrap_or_else(|| DEFAULT_ZOOM_OAUTH_TOKEN_URL.to_string()),
            card_title: get("ZOOM_CARD_TITLE").unwrap_or_else(|| "AI Assistant".to_string()),
        };

        let anthropic = AnthropicConfig {
            api_key: SecretString::from(required("ANTHROPIC_API_KEY")),
            model: get("ANTHROPIC_MODEL").unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.to_string()),
            base_url: get("ANTHROPIC_BASE_URL")
                .unwrap_or_else(|| DEFAULT_ANTHROPIC_BASE_URL.to_string()),
        };
        if !anthropic.api_key.expose_secret().starts_with("sk-ant-") {
            tracing::warn!("ANTHROPIC_API_KEY does not look like an Anthropic key (expected sk-ant- prefix)");
        }

        let port = match get("TEAMCHAT_PORT").or_else(|| get("PORT")) {
            Some(raw) => raw
                .parse()
                .map_err(|_| Error::Config(format!("invalid port: {raw}")))?,
            None => 4000,
        };

        let api_server = ApiServerConfig {
            port,
            api_key: get("TEAMCHAT_API_KEY").map(SecretString::from),
            frontend_origin: get("FRONTEND_ORIGIN"),
        };

        let defaults = RelayConfig::default();
        let relay = RelayConfig {
            stream: parse_flag(get("TEAMCHAT_STREAM"), defaults.stream)?,
            detach: parse_flag(get("TEAMCHAT_DETACH_RELAY"), defaults.detach)?,
            request_timeout: parse_secs(
                get("TEAMCHAT_REQUEST_TIMEOUT_SECS"),
                defaults.request_timeout,
            )?,
            stream_idle_timeout: parse_secs(
                get("TEAMCHAT_STREAM_IDLE_TIMEOUT_SECS"),
                defaults.stream_idle_timeout,
            )?,
        };

        Ok(Self {
            zoom,
            anthropic,
            api_server,
            relay,
        })
    }
}

fn parse_flag(value: Option<String>, default: bool) -> Result<bool> {
    let Some(raw) = value else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!("invalid boolean: {raw}"))),
    }
}

fn parse_secs(value: Option<String>, default: Duration) -> Result<Duration> {
    let Some(raw) = value else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(Error::Config(format!("invalid timeout seconds: {raw}"))),
    }
}
