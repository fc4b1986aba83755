//! Routes validated events to their effect

use std::sync::Arc;

use super::{BotNotification, InteractiveAction, TeamChatContext, TeamChatKind, ZoomEvent};
use crate::channels::{ChatDelivery, OutgoingMessage};
use crate::completion::{CompletionClient, CompletionMode};

/// Event dispatcher
///
/// Holds no per-event state; every delivery is handled on its own.
#[derive(Clone)]
pub struct Dispatcher {
    completion: Arc<CompletionClient>,
    delivery: Arc<dyn ChatDelivery>,
    stream: bool,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    #[must_use]
    pub fn new(completion: Arc<CompletionClient>, delivery: Arc<dyn ChatDelivery>, stream: bool) -> Self {
        Self {
            completion,
            delivery,
            stream,
        }
    }

    /// Completion client used for AI replies
    #[must_use]
    pub const fn completion(&self) -> &Arc<CompletionClient> {
        &self.completion
    }

    /// Apply the effect of one event
    ///
    /// Downstream failures are compensated or logged here and never surface
    /// to the webhook acknowledgment.
    pub async fn dispatch(&self, event: ZoomEvent) {
        match event {
            ZoomEvent::BotInstalled => {
                tracing::info!("Team Chat bot installed");
            }
            ZoomEvent::AppDeauthorized => {
                tracing::info!("Team Chat bot uninstalled");
            }
            ZoomEvent::BotNotification(notification) => self.relay(notification).await,
            ZoomEvent::InteractiveAction(action) => self.echo_action(action).await,
            ZoomEvent::TeamChat { kind, context } => log_team_chat(kind, &context),
            ZoomEvent::Unrecognized { event } => {
                tracing::info!(event = %event, "unsupported webhook event");
            }
        }
    }

    async fn relay(&self, notification: BotNotification) {
        tracing::info!(
            to_jid = %notification.to_jid,
            user_jid = notification.user_jid.as_deref().unwrap_or_default(),
            threaded = notification.reply_to.is_some(),
            "processing bot notification"
        );

        let outcome = self
            .completion
            .complete(
                &notification.to_jid,
                &notification.prompt,
                notification.reply_to.as_deref(),
                CompletionMode::from_flag(self.stream),
            )
            .await;

        tracing::debug!(to_jid = %notification.to_jid, ?outcome, "bot notification handled");
    }

    async fn echo_action(&self, action: InteractiveAction) {
        let Some(to_jid) = action.to_jid else {
            tracing::warn!("interactive action without toJid, nothing to answer");
            return;
        };

        let text = format!(
            "You clicked a button with value: {}",
            action.value.as_deref().unwrap_or("unknown")
        );
        if let Err(e) = self.delivery.send(&OutgoingMessage::text(to_jid.clone(), text)).await {
            tracing::error!(to_jid = %to_jid, error = %e, "failed to answer interactive action");
        }
    }
}

fn log_team_chat(kind: TeamChatKind, context: &TeamChatContext) {
    let field = |value: &Option<String>| value.clone().unwrap_or_default();

    tracing::info!(
        event = kind.as_str(),
        channel_name = %field(&context.channel_name),
        channel_id = %field(&context.channel_id),
        operator_id = %field(&context.operator_id),
        user_jid = %field(&context.user_jid),
        to_jid = %field(&context.to_jid),
        robot_jid = %field(&context.robot_jid),
        message_id = %field(&context.message_id),
        trigger_id = %field(&context.trigger_id),
        "team chat event"
    );
}
