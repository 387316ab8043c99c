//! Chat transport boundary.
//!
//! Everything the pipeline needs from the chat platform goes through
//! [`ChatTransport`]. Raw HTTP and API failures are classified into
//! [`TransportError`] here, so callers never branch on platform error shapes.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use relay_common::error::AppError;
use relay_common::types::{ChatId, MessagePayload};

/// Failure reported by the chat transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("rate limited (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    #[error("invalid destination: {0}")]
    InvalidDestination(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("network failure: {0}")]
    Network(String),

    #[error("api error {code}: {description}")]
    Api { code: u16, description: String },
}

/// Retry classification of a [`TransportError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth retrying as-is.
    Transient,
    /// Retrying the same request will fail the same way.
    Permanent,
}

impl TransportError {
    pub fn class(&self) -> ErrorClass {
        match self {
            TransportError::RateLimited { .. } | TransportError::Network(_) => ErrorClass::Transient,
            TransportError::InvalidDestination(_) | TransportError::Unauthorized(_) => {
                ErrorClass::Permanent
            }
            TransportError::Api { code, .. } if *code >= 500 => ErrorClass::Transient,
            TransportError::Api { code, .. } if (400..500).contains(code) => ErrorClass::Permanent,
            // unknown shapes are retried
            TransportError::Api { .. } => ErrorClass::Transient,
        }
    }

    /// Bad credentials. Nothing in the process can recover from this.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransportError::Unauthorized(_))
    }
}

impl From<TransportError> for AppError {
    fn from(err: TransportError) -> Self {
        AppError::Transport(err.to_string())
    }
}

/// An entry from the inbound update feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<BotUser>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Entry of the command menu registered with the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotCommand {
    pub command: String,
    pub description: String,
}

impl BotCommand {
    pub fn new(command: &str, description: &str) -> Self {
        Self {
            command: command.to_string(),
            description: description.to_string(),
        }
    }
}

/// Operations consumed from the chat platform.
pub trait ChatTransport: Send + Sync + 'static {
    /// Deliver one message to one chat.
    fn send_message(
        &self,
        chat: ChatId,
        payload: &MessagePayload,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Long-poll for updates with id `>= offset`, waiting at most `timeout`
    /// server-side. Results are in ascending `update_id` order.
    fn get_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<Update>, TransportError>> + Send;

    /// Identity of the bot behind the configured credentials.
    fn get_me(&self) -> impl Future<Output = Result<BotUser, TransportError>> + Send;

    /// Replace the command menu shown to users.
    fn set_my_commands(
        &self,
        commands: &[BotCommand],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(
            TransportError::RateLimited { retry_after: Some(3) }.class(),
            ErrorClass::Transient
        );
        assert_eq!(
            TransportError::Network("reset".into()).class(),
            ErrorClass::Transient
        );
        assert_eq!(
            TransportError::InvalidDestination("chat not found".into()).class(),
            ErrorClass::Permanent
        );
        assert_eq!(
            TransportError::Api { code: 502, description: "Bad Gateway".into() }.class(),
            ErrorClass::Transient
        );
        assert_eq!(
            TransportError::Api { code: 400, description: "can't parse entities".into() }.class(),
            ErrorClass::Permanent
        );
    }

    #[test]
    fn test_only_unauthorized_is_fatal() {
        assert!(TransportError::Unauthorized("bad token".into()).is_fatal());
        assert!(!TransportError::Network("timeout".into()).is_fatal());
        assert!(!TransportError::RateLimited { retry_after: None }.is_fatal());
    }

    #[test]
    fn test_update_deserializes_without_message() {
        let update: Update = serde_json::from_str(r#"{"update_id": 42}"#).unwrap();
        assert_eq!(update.update_id, 42);
        assert!(update.message.is_none());
    }

    #[test]
    fn test_update_deserializes_text_message() {
        let update: Update = serde_json::from_value(serde_json::json!({
            "update_id": 7,
            "message": {
                "message_id": 1,
                "chat": {"id": -100, "type": "group", "title": "ops"},
                "from": {"id": 9, "is_bot": false, "first_name": "Ana"},
                "text": "/metrics staging"
            }
        }))
        .unwrap();
        let message = update.message.unwrap();
        assert_eq!(message.chat.id, ChatId(-100));
        assert_eq!(message.text.as_deref(), Some("/metrics staging"));
    }
}
