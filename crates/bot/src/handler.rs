//! Inbound command handling.
//!
//! Turns one update into at most one reply, sent straight to the requesting
//! chat. Replies are not broadcasts and never go through the delivery queue.

use std::sync::Arc;

use relay_common::error::AppError;
use relay_common::types::{ChatId, MessagePayload};
use relay_notifier::recipients::RecipientDirectory;
use relay_notifier::transport::{ChatTransport, Update};

use crate::commands::{Command, help_text};
use crate::metrics::MetricsCache;

pub const NOT_SUBSCRIBED: &str =
    "⛔ This chat is not subscribed. Send /subscribe to start receiving notifications.";
pub const SUBSCRIBED: &str = "✅ Subscribed. Notifications will be delivered to this chat.";
pub const ALREADY_SUBSCRIBED: &str = "ℹ️ This chat is already subscribed.";
pub const UNSUBSCRIBED: &str = "👋 Unsubscribed. This chat will no longer receive notifications.";
pub const FIXED_DESTINATION: &str =
    "ℹ️ Notifications go to a configured chat; subscriptions cannot be changed from here.";

const WELCOME_DYNAMIC: &str =
    "👋 Ops relay bot. Send /subscribe to receive notifications in this chat, /help for commands.";
const WELCOME_FIXED: &str =
    "👋 Ops relay bot. Notifications are delivered to the configured chat. Send /help for commands.";

/// What the handler did with an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// Not a text command; nothing sent.
    Ignored,
    /// Sender failed the subscription gate.
    Rejected(Command),
    Replied(Command),
}

pub struct CommandHandler<T> {
    transport: Arc<T>,
    directory: RecipientDirectory,
    metrics: MetricsCache,
    default_source: String,
    bot_username: Option<String>,
}

impl<T: ChatTransport> CommandHandler<T> {
    pub fn new(
        transport: Arc<T>,
        directory: RecipientDirectory,
        metrics: MetricsCache,
        default_source: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            directory,
            metrics,
            default_source: default_source.into(),
            bot_username: None,
        }
    }

    /// Only accept `/cmd@username` mentions addressed to this bot.
    pub fn with_bot_username(mut self, username: Option<String>) -> Self {
        self.bot_username = username;
        self
    }

    pub async fn handle(&self, update: &Update) -> Result<Handled, AppError> {
        let Some(message) = &update.message else {
            return Ok(Handled::Ignored);
        };
        let Some(text) = message.text.as_deref() else {
            return Ok(Handled::Ignored);
        };
        let Some(command) = Command::parse(text, self.bot_username.as_deref()) else {
            return Ok(Handled::Ignored);
        };

        let chat = message.chat.id;
        tracing::debug!(
            update_id = update.update_id,
            chat_id = %chat,
            command = ?command,
            "Handling command"
        );

        if self.directory.is_dynamic()
            && command.requires_subscription()
            && !self.directory.contains(chat).await?
        {
            self.reply(chat, MessagePayload::text(NOT_SUBSCRIBED)).await?;
            return Ok(Handled::Rejected(command));
        }

        let reply = self.respond(&command, chat).await?;
        self.reply(chat, reply).await?;
        Ok(Handled::Replied(command))
    }

    async fn respond(&self, command: &Command, chat: ChatId) -> Result<MessagePayload, AppError> {
        let dynamic = self.directory.is_dynamic();

        let payload = match command {
            Command::Start if dynamic => MessagePayload::text(WELCOME_DYNAMIC),
            Command::Start => MessagePayload::text(WELCOME_FIXED),
            Command::Help => MessagePayload::text(help_text()),
            Command::Subscribe | Command::Unsubscribe if !dynamic => {
                MessagePayload::text(FIXED_DESTINATION)
            }
            Command::Subscribe => {
                if self.directory.add(chat).await? {
                    MessagePayload::text(SUBSCRIBED)
                } else {
                    MessagePayload::text(ALREADY_SUBSCRIBED)
                }
            }
            Command::Unsubscribe => {
                if self.directory.remove(chat).await? {
                    MessagePayload::text(UNSUBSCRIBED)
                } else {
                    MessagePayload::text(NOT_SUBSCRIBED)
                }
            }
            Command::Metrics { source } => {
                let source = source.as_deref().unwrap_or(&self.default_source);
                MessagePayload::html(self.metrics.format(source).await)
            }
            Command::Identify => {
                MessagePayload::html(format!("🆔 Chat id: <code>{}</code>", chat))
            }
        };
        Ok(payload)
    }

    async fn reply(&self, chat: ChatId, payload: MessagePayload) -> Result<(), AppError> {
        self.transport
            .send_message(chat, &payload)
            .await
            .map_err(AppError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MetricCounters, NO_DATA_YET};
    use relay_notifier::mock::MockTransport;
    use relay_notifier::recipients::SubscriberStore;
    use relay_notifier::transport::{Chat, IncomingMessage, TransportError};

    const CHAT: ChatId = ChatId(42);

    fn update(id: i64, chat: ChatId, text: &str) -> Update {
        Update {
            update_id: id,
            message: Some(IncomingMessage {
                message_id: id,
                chat: Chat {
                    id: chat,
                    kind: "private".to_string(),
                    title: None,
                },
                from: None,
                text: Some(text.to_string()),
            }),
        }
    }

    fn dynamic_handler(transport: Arc<MockTransport>) -> (CommandHandler<MockTransport>, RecipientDirectory) {
        let directory = RecipientDirectory::Subscribers(SubscriberStore::memory());
        let handler = CommandHandler::new(
            transport,
            directory.clone(),
            MetricsCache::new(60),
            "production",
        );
        (handler, directory)
    }

    #[tokio::test]
    async fn test_plain_text_ignored() {
        let transport = Arc::new(MockTransport::new());
        let (handler, _) = dynamic_handler(transport.clone());

        let handled = handler.handle(&update(1, CHAT, "good morning")).await.unwrap();
        assert_eq!(handled, Handled::Ignored);
        assert_eq!(
            handler.handle(&Update { update_id: 2, message: None }).await.unwrap(),
            Handled::Ignored
        );
        assert_eq!(transport.send_calls().await, 0);
    }

    #[tokio::test]
    async fn test_unsubscribed_chat_is_gated() {
        let transport = Arc::new(MockTransport::new());
        let (handler, _) = dynamic_handler(transport.clone());

        let handled = handler.handle(&update(1, CHAT, "/metrics")).await.unwrap();
        assert_eq!(handled, Handled::Rejected(Command::Metrics { source: None }));
        assert_eq!(transport.sent_to(CHAT).await, vec![NOT_SUBSCRIBED]);
    }

    #[tokio::test]
    async fn test_subscribe_then_metrics() {
        let transport = Arc::new(MockTransport::new());
        let (handler, directory) = dynamic_handler(transport.clone());

        handler.handle(&update(1, CHAT, "/subscribe")).await.unwrap();
        assert!(directory.contains(CHAT).await.unwrap());

        handler.handle(&update(2, CHAT, "/subscribe")).await.unwrap();
        let handled = handler.handle(&update(3, CHAT, "/metrics")).await.unwrap();
        assert_eq!(handled, Handled::Replied(Command::Metrics { source: None }));

        assert_eq!(
            transport.sent_to(CHAT).await,
            vec![SUBSCRIBED, ALREADY_SUBSCRIBED, NO_DATA_YET]
        );
    }

    #[tokio::test]
    async fn test_metrics_for_named_source() {
        let transport = Arc::new(MockTransport::new());
        let directory = RecipientDirectory::Fixed(CHAT);
        let metrics = MetricsCache::new(60);
        metrics
            .update(
                "staging",
                MetricCounters {
                    errors_total: 3,
                    ..MetricCounters::default()
                },
            )
            .await;
        let handler = CommandHandler::new(transport.clone(), directory, metrics, "production");

        handler.handle(&update(1, CHAT, "/metrics staging")).await.unwrap();
        handler.handle(&update(2, CHAT, "/metrics")).await.unwrap();

        let sent = transport.sent_to(CHAT).await;
        assert!(sent[0].contains("Errors: 3 (+0 today)"));
        assert_eq!(sent[1], NO_DATA_YET);
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_chat() {
        let transport = Arc::new(MockTransport::new());
        let (handler, directory) = dynamic_handler(transport.clone());
        directory.add(CHAT).await.unwrap();

        handler.handle(&update(1, CHAT, "/unsubscribe")).await.unwrap();
        assert!(!directory.contains(CHAT).await.unwrap());
        assert_eq!(transport.sent_to(CHAT).await, vec![UNSUBSCRIBED]);
    }

    #[tokio::test]
    async fn test_fixed_mode_has_no_gate_and_no_subscriptions() {
        let transport = Arc::new(MockTransport::new());
        let directory = RecipientDirectory::Fixed(ChatId(-1));
        let handler = CommandHandler::new(
            transport.clone(),
            directory.clone(),
            MetricsCache::new(60),
            "production",
        );

        handler.handle(&update(1, CHAT, "/subscribe")).await.unwrap();
        handler.handle(&update(2, CHAT, "/id")).await.unwrap();

        let sent = transport.sent_to(CHAT).await;
        assert_eq!(sent[0], FIXED_DESTINATION);
        assert!(sent[1].contains("<code>42</code>"));
        assert_eq!(
            directory.list_all().await.unwrap().into_iter().collect::<Vec<_>>(),
            vec![ChatId(-1)]
        );
    }

    #[tokio::test]
    async fn test_reply_failure_is_reported() {
        let transport = Arc::new(MockTransport::new());
        transport
            .fail_always(CHAT, TransportError::InvalidDestination("blocked".into()))
            .await;
        let (handler, _) = dynamic_handler(transport.clone());

        let result = handler.handle(&update(1, CHAT, "/start")).await;
        assert!(matches!(result, Err(AppError::Transport(_))));
    }
}
