//! In-process delivery queue.
//!
//! Owns every pending outbound message and its attempt bookkeeping. Producers
//! only call [`DeliveryQueue::enqueue`]; the dispatcher is the sole caller of
//! the drain/record methods. All mutation goes through one async mutex.
//!
//! Messages are kept in enqueue order. [`DeliveryQueue::drain`] scans the whole
//! queue, so a message waiting out its backoff never blocks a ready one behind it.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use relay_common::types::{ChatId, MessageKind, MessagePayload};

use crate::backoff::BackoffPolicy;

/// Default number of failed attempts after which a message is dropped.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Number of permanently failed messages retained for inspection.
const DEAD_LETTER_CAPACITY: usize = 100;

/// One pending outbound notification.
#[derive(Debug, Clone, Serialize)]
pub struct QueuedMessage {
    pub id: Uuid,
    pub kind: MessageKind,
    pub payload: MessagePayload,
    /// Failed send attempts so far.
    pub attempts: u32,
    /// Time of the most recent failed attempt. `None` means never attempted.
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Recipients that already accepted this message.
    pub delivered_to: BTreeSet<ChatId>,
}

impl QueuedMessage {
    fn new(kind: MessageKind, payload: MessagePayload, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            payload,
            attempts: 0,
            last_attempt_at: None,
            created_at: now,
            delivered_to: BTreeSet::new(),
        }
    }

    /// Whether the backoff for the current attempt count has elapsed.
    pub fn is_ready(&self, now: DateTime<Utc>, backoff: &BackoffPolicy) -> bool {
        match self.last_attempt_at {
            None => true,
            Some(last) => now.signed_duration_since(last) >= to_chrono(backoff.delay(self.attempts)),
        }
    }
}

/// Result of recording a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Still queued; eligible again at `next_attempt_at`.
    Retrying {
        attempts: u32,
        next_attempt_at: DateTime<Utc>,
    },
    /// Attempt ceiling reached; removed from the queue.
    Dropped { attempts: u32 },
}

/// A message removed after exhausting its attempts.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub id: Uuid,
    pub kind: MessageKind,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub dropped_at: DateTime<Utc>,
}

/// Read-only observability snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub total_pending: usize,
    pub pending_by_kind: BTreeMap<MessageKind, usize>,
    pub oldest_pending_at: Option<DateTime<Utc>>,
    pub delivered_total: u64,
    pub dropped_total: u64,
}

#[derive(Default)]
struct QueueState {
    messages: VecDeque<QueuedMessage>,
    dead_letters: VecDeque<DeadLetter>,
    delivered_total: u64,
    dropped_total: u64,
}

impl QueueState {
    fn position(&self, id: Uuid) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }
}

/// Shared handle to the delivery queue. Cheap to clone.
#[derive(Clone)]
pub struct DeliveryQueue {
    state: Arc<Mutex<QueueState>>,
    wake: Arc<Notify>,
    backoff: BackoffPolicy,
    max_attempts: u32,
}

impl DeliveryQueue {
    pub fn new(backoff: BackoffPolicy, max_attempts: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            wake: Arc::new(Notify::new()),
            backoff,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Append a message and wake the dispatcher. Never waits on the transport.
    pub async fn enqueue(&self, kind: MessageKind, payload: MessagePayload) -> Uuid {
        let message = QueuedMessage::new(kind, payload, Utc::now());
        let id = message.id;

        let pending = {
            let mut state = self.state.lock().await;
            state.messages.push_back(message);
            state.messages.len()
        };

        tracing::debug!(message_id = %id, kind = %kind, pending, "Message enqueued");
        self.wake.notify_one();
        id
    }

    /// Resolves once something has been enqueued since the last wake-up.
    pub async fn notified(&self) {
        self.wake.notified().await;
    }

    /// Snapshot of every message ready for an attempt, oldest first.
    pub async fn drain(&self) -> Vec<QueuedMessage> {
        self.drain_at(Utc::now()).await
    }

    pub async fn drain_at(&self, now: DateTime<Utc>) -> Vec<QueuedMessage> {
        let state = self.state.lock().await;
        state
            .messages
            .iter()
            .filter(|m| m.is_ready(now, &self.backoff))
            .cloned()
            .collect()
    }

    /// Mark one recipient of a broadcast as done. Returns `false` for unknown ids.
    pub async fn record_delivery(&self, id: Uuid, chat: ChatId) -> bool {
        let mut state = self.state.lock().await;
        match state.position(id) {
            Some(pos) => {
                state.messages[pos].delivered_to.insert(chat);
                true
            }
            None => false,
        }
    }

    /// Remove a fully delivered message. Returns `false` for unknown ids.
    pub async fn record_success(&self, id: Uuid) -> bool {
        let mut state = self.state.lock().await;
        let Some(pos) = state.position(id) else {
            return false;
        };
        if let Some(message) = state.messages.remove(pos) {
            state.delivered_total += 1;
            tracing::debug!(
                message_id = %id,
                kind = %message.kind,
                attempts = message.attempts,
                "Message delivered"
            );
        }
        true
    }

    /// Count a failed attempt. Returns `None` for unknown ids.
    pub async fn record_failure(&self, id: Uuid) -> Option<FailureOutcome> {
        self.record_failure_at(id, Utc::now()).await
    }

    pub async fn record_failure_at(&self, id: Uuid, now: DateTime<Utc>) -> Option<FailureOutcome> {
        let mut state = self.state.lock().await;
        let pos = state.position(id)?;

        let attempts = state.messages[pos].attempts.saturating_add(1);

        if attempts >= self.max_attempts {
            let message = state.messages.remove(pos)?;
            state.dropped_total += 1;

            tracing::error!(
                message_id = %id,
                kind = %message.kind,
                attempts,
                created_at = %message.created_at,
                delivered_to = message.delivered_to.len(),
                "Message permanently failed, dropping"
            );

            if state.dead_letters.len() == DEAD_LETTER_CAPACITY {
                state.dead_letters.pop_front();
            }
            state.dead_letters.push_back(DeadLetter {
                id,
                kind: message.kind,
                attempts,
                created_at: message.created_at,
                dropped_at: now,
            });

            return Some(FailureOutcome::Dropped { attempts });
        }

        let message = &mut state.messages[pos];
        message.attempts = attempts;
        message.last_attempt_at = Some(now);
        let next_attempt_at = now + to_chrono(self.backoff.delay(attempts));

        tracing::warn!(
            message_id = %id,
            attempts,
            max_attempts = self.max_attempts,
            next_attempt_at = %next_attempt_at,
            "Delivery failed, scheduled for retry"
        );

        Some(FailureOutcome::Retrying {
            attempts,
            next_attempt_at,
        })
    }

    pub async fn status(&self) -> QueueStatus {
        let state = self.state.lock().await;

        let mut pending_by_kind = BTreeMap::new();
        for message in &state.messages {
            *pending_by_kind.entry(message.kind).or_insert(0) += 1;
        }

        QueueStatus {
            total_pending: state.messages.len(),
            pending_by_kind,
            oldest_pending_at: state.messages.iter().map(|m| m.created_at).min(),
            delivered_total: state.delivered_total,
            dropped_total: state.dropped_total,
        }
    }

    /// Most recently dropped messages, oldest first.
    pub async fn recent_drops(&self) -> Vec<DeadLetter> {
        self.state.lock().await.dead_letters.iter().cloned().collect()
    }
}

impl Default for DeliveryQueue {
    fn default() -> Self {
        Self::new(BackoffPolicy::default(), DEFAULT_MAX_ATTEMPTS)
    }
}

fn to_chrono(delay: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::days(365))
}
