//! Zoom Team Chat chatbot message wire types

use serde::{Deserialize, Serialize};

/// Body of `POST /im/chat/messages`
#[derive(Debug, Serialize)]
pub struct ChatbotMessage<'a> {
    pub robot_jid: &'a str,
    pub to_jid: &'a str,
    pub user_jid: &'a str,
    pub account_id: &'a str,
    pub content: CardContent<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<&'a str>,
}

/// Headline/body card the chatbot API requires
#[derive(Debug, Serialize)]
pub struct CardContent<'a> {
    pub head: CardHead<'a>,
    pub body: Vec<CardBodyItem<'a>>,
}

/// Card headline
#[derive(Debug, Serialize)]
pub struct CardHead<'a> {
    pub text: &'a str,
    pub style: HeadStyle,
}

/// Card headline style
#[derive(Debug, Serialize)]
pub struct HeadStyle {
    pub bold: bool,
}

/// Card body elements
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CardBodyItem<'a> {
    Message { text: &'a str },
}

/// Error body returned by the Zoom REST API
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    #[serde(default)]
    pub message: Option<String>,
}
