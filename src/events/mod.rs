//! Zoom Team Chat webhook events
//!
//! A delivery arrives as a loose `{event, payload}` envelope. [`ZoomEvent`]
//! is the closed, validated form handed to the [`Dispatcher`]; anything the
//! relay does not act on becomes [`ZoomEvent::Unrecognized`].

mod dispatcher;

pub use dispatcher::Dispatcher;

use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;

use crate::conversation::ConversationKey;
use crate::{Error, Result};

/// Endpoint ownership challenge, answered before signature checks
pub const URL_VALIDATION_EVENT: &str = "endpoint.url_validation";

/// Raw webhook body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
}

impl WebhookEnvelope {
    /// Parse a raw body
    ///
    /// # Errors
    ///
    /// Returns a validation error if the body is not a JSON object
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body)
            .map_err(|e| Error::Validation(vec![format!("Invalid JSON body: {e}")]))
    }

    /// Event type, if present and non-blank
    #[must_use]
    pub fn event_type(&self) -> Option<&str> {
        self.event.as_deref().filter(|e| !e.trim().is_empty())
    }

    #[must_use]
    pub fn is_url_validation(&self) -> bool {
        self.event_type() == Some(URL_VALIDATION_EVENT)
    }

    /// Challenge token of a URL validation event
    ///
    /// # Errors
    ///
    /// Returns a validation error if `payload.plainToken` is missing
    pub fn plain_token(&self) -> Result<&str> {
        self.payload
            .as_ref()
            .and_then(|p| p.get("plainToken"))
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                Error::Validation(vec!["plainToken is required for endpoint validation".to_string()])
            })
    }
}

/// `bot_notification`: a user wrote to the chatbot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotNotification {
    /// Conversation the reply goes to
    pub to_jid: ConversationKey,
    /// Slash command text, else the free-text message
    pub prompt: String,
    pub user_jid: Option<String>,
    pub account_id: Option<String>,
    pub robot_jid: Option<String>,
    /// Message to thread the reply under
    pub reply_to: Option<String>,
}

/// A button click on a chatbot card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractiveAction {
    pub to_jid: Option<ConversationKey>,
    pub value: Option<String>,
}

/// Team Chat app lifecycle notifications that are only logged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamChatKind {
    AppMention,
    AppConversationOpened,
    AppInvited,
    ChannelAppAdded,
    AppRemoved,
}

impl TeamChatKind {
    fn from_event(event: &str) -> Option<Self> {
        match event {
            "team_chat.app_mention" => Some(Self::AppMention),
            "team_chat.app_conversation_opened" => Some(Self::AppConversationOpened),
            "team_chat.app_invited" => Some(Self::AppInvited),
            "team_chat.channel_app_added" => Some(Self::ChannelAppAdded),
            "team_chat.app_removed" => Some(Self::AppRemoved),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AppMention => "team_chat.app_mention",
            Self::AppConversationOpened => "team_chat.app_conversation_opened",
            Self::AppInvited => "team_chat.app_invited",
            Self::ChannelAppAdded => "team_chat.channel_app_added",
            Self::AppRemoved => "team_chat.app_removed",
        }
    }
}

/// Structured context carried by `team_chat.*` events
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TeamChatContext {
    pub channel_name: Option<String>,
    pub channel_id: Option<String>,
    pub message: Option<String>,
    pub message_id: Option<String>,
    pub robot_jid: Option<String>,
    pub to_jid: Option<String>,
    pub user_jid: Option<String>,
    pub trigger_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(skip)]
    pub operator_id: Option<String>,
}

/// A validated inbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoomEvent {
    BotInstalled,
    AppDeauthorized,
    BotNotification(BotNotification),
    InteractiveAction(InteractiveAction),
    TeamChat {
        kind: TeamChatKind,
        context: TeamChatContext,
    },
    Unrecognized {
        event: String,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BotNotificationPayload {
    to_jid: Option<String>,
    cmd: Option<String>,
    message: Option<String>,
    user_jid: Option<String>,
    account_id: Option<String>,
    robot_jid: Option<String>,
    reply_to: Option<String>,
    #[serde(rename = "reply_to")]
    reply_to_snake: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InteractivePayload {
    to_jid: Option<String>,
    action_item: Option<ActionItem>,
}

#[derive(Debug, Default, Deserialize)]
struct ActionItem {
    value: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct TeamChatPayload {
    #[serde(default)]
    object: TeamChatContext,
    operator_id: Option<String>,
}

impl TryFrom<&WebhookEnvelope> for ZoomEvent {
    type Error = Error;

    /// Validate event-specific required fields and decode
    ///
    /// Every problem found is reported, not just the first.
    fn try_from(envelope: &WebhookEnvelope) -> Result<Self> {
        let Some(event) = envelope.event_type() else {
            return Err(Error::Validation(vec!["Event type is required".to_string()]));
        };

        match event {
            "bot_installed" => Ok(Self::BotInstalled),
            "app_deauthorized" => Ok(Self::AppDeauthorized),
            "bot_notification" => decode_bot_notification(envelope.payload.as_ref()),
            "interactive_message_actions" | "interactive_message_action" => {
                let payload: InteractivePayload = lenient_payload(envelope.payload.as_ref());
                Ok(Self::InteractiveAction(InteractiveAction {
                    to_jid: non_blank(payload.to_jid).map(ConversationKey::from),
                    value: payload
                        .action_item
                        .and_then(|item| item.value)
                        .and_then(|value| match value {
                            Value::Null => None,
                            Value::String(s) => non_blank(Some(s)),
                            other => Some(other.to_string()),
                        }),
                }))
            }
            other => match TeamChatKind::from_event(other) {
                Some(kind) => {
                    let payload: TeamChatPayload = lenient_payload(envelope.payload.as_ref());
                    let mut context = payload.object;
                    context.operator_id = payload.operator_id;
                    Ok(Self::TeamChat { kind, context })
                }
                None => Ok(Self::Unrecognized {
                    event: other.to_string(),
                }),
            },
        }
    }
}

fn decode_bot_notification(payload: Option<&Value>) -> Result<ZoomEvent> {
    let Some(payload) = payload.filter(|p| !p.is_null()) else {
        return Err(Error::Validation(vec![
            "Payload.payload is required for bot_notification events".to_string(),
        ]));
    };

    let payload: BotNotificationPayload = serde_json::from_value(payload.clone())
        .map_err(|e| Error::Validation(vec![format!("Invalid bot_notification payload: {e}")]))?;

    let to_jid = non_blank(payload.to_jid);
    let prompt = non_blank(payload.cmd).or_else(|| non_blank(payload.message));

    let mut errors = Vec::new();
    if to_jid.is_none() {
        errors.push("toJid is required in bot_notification payload".to_string());
    }
    if prompt.is_none() {
        errors.push("Either cmd or message is required in bot_notification payload".to_string());
    }

    match (to_jid, prompt) {
        (Some(to_jid), Some(prompt)) => Ok(ZoomEvent::BotNotification(BotNotification {
            to_jid: ConversationKey::from(to_jid),
            prompt,
            user_jid: non_blank(payload.user_jid),
            account_id: non_blank(payload.account_id),
            robot_jid: non_blank(payload.robot_jid),
            reply_to: non_blank(payload.reply_to).or_else(|| non_blank(payload.reply_to_snake)),
        })),
        _ => Err(Error::Validation(errors)),
    }
}

/// Decode fields of a log-only payload; shape problems are not fatal
fn lenient_payload<T: DeserializeOwned + Default>(payload: Option<&Value>) -> T {
    payload
        .and_then(|p| {
            serde_json::from_value(p.clone())
                .map_err(|e| tracing::debug!(error = %e, "ignoring unexpected payload shape"))
                .ok()
        })
        .unwrap_or_default()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn envelope(value: Value) -> WebhookEnvelope {
        serde_json::from_value(value).unwrap()
    }

    fn validation_errors(value: Value) -> Vec<String> {
        match ZoomEvent::try_from(&envelope(value)) {
            Err(Error::Validation(errors)) => errors,
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn test_bot_notification_decoded() {
        let event = ZoomEvent::try_from(&envelope(json!({
            "event": "bot_notification",
            "payload": {
                "toJid": "u1@x",
                "cmd": "hi",
                "message": "ignored when cmd present",
                "userJid": "u1@x",
                "accountId": "acct",
                "robotJid": "bot@x",
                "replyTo": "m-1"
            }
        })))
        .unwrap();

        assert_eq!(
            event,
            ZoomEvent::BotNotification(BotNotification {
                to_jid: ConversationKey::from("u1@x"),
                prompt: "hi".to_string(),
                user_jid: Some("u1@x".to_string()),
                account_id: Some("acct".to_string()),
                robot_jid: Some("bot@x".to_string()),
                reply_to: Some("m-1".to_string()),
            })
        );
    }

    #[test]
    fn test_message_used_when_cmd_blank() {
        let event = ZoomEvent::try_from(&envelope(json!({
            "event": "bot_notification",
            "payload": {"toJid": "u1@x", "cmd": "", "message": "hello", "reply_to": "m-2"}
        })))
        .unwrap();

        let ZoomEvent::BotNotification(notification) = event else {
            panic!("expected bot notification");
        };
        assert_eq!(notification.prompt, "hello");
        assert_eq!(notification.reply_to.as_deref(), Some("m-2"));
    }

    #[test]
    fn test_both_reply_keys_accepted() {
        let event = ZoomEvent::try_from(&envelope(json!({
            "event": "bot_notification",
            "payload": {"toJid": "u1@x", "cmd": "hi", "replyTo": "m-3", "reply_to": "m-4"}
        })))
        .unwrap();

        let ZoomEvent::BotNotification(notification) = event else {
            panic!("expected bot notification");
        };
        assert_eq!(notification.reply_to.as_deref(), Some("m-3"));
    }

    #[test]
    fn test_bot_notification_field_errors_listed() {
        assert_eq!(
            validation_errors(json!({"event": "bot_notification", "payload": {}})),
            vec![
                "toJid is required in bot_notification payload",
                "Either cmd or message is required in bot_notification payload"
            ]
        );
        assert_eq!(
            validation_errors(json!({"event": "bot_notification"})),
            vec!["Payload.payload is required for bot_notification events"]
        );
    }

    #[test]
    fn test_event_type_required() {
        assert_eq!(
            validation_errors(json!({"payload": {}})),
            vec!["Event type is required"]
        );
        assert_eq!(
            validation_errors(json!({"event": "  "})),
            vec!["Event type is required"]
        );
    }

    #[test]
    fn test_unknown_event_admitted() {
        let event = ZoomEvent::try_from(&envelope(json!({"event": "foo", "payload": {}}))).unwrap();
        assert_eq!(
            event,
            ZoomEvent::Unrecognized {
                event: "foo".to_string()
            }
        );
    }

    #[test]
    fn test_interactive_action_value() {
        for name in ["interactive_message_actions", "interactive_message_action"] {
            let event = ZoomEvent::try_from(&envelope(json!({
                "event": name,
                "payload": {"toJid": "u1@x", "actionItem": {"text": "Yes", "value": "yes"}}
            })))
            .unwrap();
            assert_eq!(
                event,
                ZoomEvent::InteractiveAction(InteractiveAction {
                    to_jid: Some(ConversationKey::from("u1@x")),
                    value: Some("yes".to_string()),
                })
            );
        }

        let event = ZoomEvent::try_from(&envelope(json!({
            "event": "interactive_message_actions",
            "payload": {"toJid": "u1@x"}
        })))
        .unwrap();
        assert!(matches!(event, ZoomEvent::InteractiveAction(InteractiveAction { value: None, .. })));
    }

    #[test]
    fn test_team_chat_context() {
        let event = ZoomEvent::try_from(&envelope(json!({
            "event": "team_chat.app_invited",
            "payload": {
                "operator_id": "op-1",
                "object": {"channel_name": "general", "channel_id": "c-1", "to_jid": "c-1@conference.x"}
            }
        })))
        .unwrap();

        let ZoomEvent::TeamChat { kind, context } = event else {
            panic!("expected team chat event");
        };
        assert_eq!(kind, TeamChatKind::AppInvited);
        assert_eq!(context.channel_name.as_deref(), Some("general"));
        assert_eq!(context.operator_id.as_deref(), Some("op-1"));
    }

    #[test]
    fn test_plain_token() {
        let env = envelope(json!({"event": URL_VALIDATION_EVENT, "payload": {"plainToken": "abc"}}));
        assert!(env.is_url_validation());
        assert_eq!(env.plain_token().unwrap(), "abc");

        let env = envelope(json!({"event": URL_VALIDATION_EVENT, "payload": {}}));
        assert!(matches!(env.plain_token(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_non_object_body_rejected() {
        assert!(matches!(
            WebhookEnvelope::from_slice(b"[1,2]"),
            Err(Error::Validation(_))
        ));
        assert!(WebhookEnvelope::from_slice(b"not json").is_err());
    }
}
