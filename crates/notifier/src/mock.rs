//! Scripted in-memory [`ChatTransport`] for tests and local dry runs.
//!
//! Records every outbound message, returns queued failures per chat, and replays
//! a script of `getUpdates` results.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::sync::Mutex;

use relay_common::types::{ChatId, MessagePayload};

use crate::transport::{BotCommand, BotUser, ChatTransport, TransportError, Update};

/// One message accepted by the mock transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub chat: ChatId,
    pub text: String,
}

#[derive(Default)]
struct MockState {
    sent: Vec<SentMessage>,
    send_calls: usize,
    failures: HashMap<ChatId, VecDeque<TransportError>>,
    always_fail: HashMap<ChatId, TransportError>,
    send_delay: Duration,
    updates: VecDeque<Result<Vec<Update>, TransportError>>,
    polled_offsets: Vec<i64>,
    commands: Vec<BotCommand>,
    me: Option<Result<BotUser, TransportError>>,
}

#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` sends to `chat` with `error`, then succeed.
    pub async fn fail_next(&self, chat: ChatId, times: usize, error: TransportError) {
        let mut state = self.state.lock().await;
        let queue = state.failures.entry(chat).or_default();
        queue.extend(std::iter::repeat_n(error, times));
    }

    /// Fail every send to `chat` with `error`.
    pub async fn fail_always(&self, chat: ChatId, error: TransportError) {
        self.state.lock().await.always_fail.insert(chat, error);
    }

    /// Hold every send for `delay` before answering.
    pub async fn set_send_delay(&self, delay: Duration) {
        self.state.lock().await.send_delay = delay;
    }

    /// Queue one `getUpdates` result.
    pub async fn push_updates(&self, result: Result<Vec<Update>, TransportError>) {
        self.state.lock().await.updates.push_back(result);
    }

    pub async fn set_me(&self, result: Result<BotUser, TransportError>) {
        self.state.lock().await.me = Some(result);
    }

    /// Messages accepted so far, in send order.
    pub async fn sent(&self) -> Vec<SentMessage> {
        self.state.lock().await.sent.clone()
    }

    pub async fn sent_to(&self, chat: ChatId) -> Vec<String> {
        self.state
            .lock()
            .await
            .sent
            .iter()
            .filter(|m| m.chat == chat)
            .map(|m| m.text.clone())
            .collect()
    }

    /// Every send attempt, successful or not.
    pub async fn send_calls(&self) -> usize {
        self.state.lock().await.send_calls
    }

    /// Offsets passed to `get_updates`, in call order.
    pub async fn polled_offsets(&self) -> Vec<i64> {
        self.state.lock().await.polled_offsets.clone()
    }

    pub async fn registered_commands(&self) -> Vec<BotCommand> {
        self.state.lock().await.commands.clone()
    }
}

impl ChatTransport for MockTransport {
    async fn send_message(&self, chat: ChatId, payload: &MessagePayload) -> Result<(), TransportError> {
        let delay = {
            let mut state = self.state.lock().await;
            state.send_calls += 1;
            state.send_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().await;
        if let Some(error) = state.always_fail.get(&chat) {
            return Err(error.clone());
        }
        if let Some(error) = state.failures.get_mut(&chat).and_then(|q| q.pop_front()) {
            return Err(error);
        }

        state.sent.push(SentMessage {
            chat,
            text: payload.body().to_string(),
        });
        Ok(())
    }

    async fn get_updates(&self, offset: i64, timeout: Duration) -> Result<Vec<Update>, TransportError> {
        let next = {
            let mut state = self.state.lock().await;
            state.polled_offsets.push(offset);
            state.updates.pop_front()
        };

        match next {
            Some(result) => result,
            None => {
                // Nothing scripted: behave like an idle long-poll.
                tokio::time::sleep(timeout).await;
                Ok(Vec::new())
            }
        }
    }

    async fn get_me(&self) -> Result<BotUser, TransportError> {
        let state = self.state.lock().await;
        state.me.clone().unwrap_or_else(|| {
            Ok(BotUser {
                id: 1,
                is_bot: true,
                first_name: "Relay".to_string(),
                username: Some("relay_bot".to_string()),
            })
        })
    }

    async fn set_my_commands(&self, commands: &[BotCommand]) -> Result<(), TransportError> {
        self.state.lock().await.commands = commands.to_vec();
        Ok(())
    }
}
