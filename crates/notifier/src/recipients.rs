//! Recipient directory: who receives broadcasts.
//!
//! A deployment uses one of two shapes:
//! - `Subscribers`: chats that opted in via `/subscribe`, persisted in a Redis set
//!   (or an in-memory set for tests and single-shot tools)
//! - `Fixed`: one statically configured chat; subscription commands are disabled
//!
//! The dispatcher reads the set fresh on every pass, so a subscribe or unsubscribe
//! takes effect by the next tick at the latest.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::RwLock;

use relay_common::error::AppError;
use relay_common::types::ChatId;

/// Backing store for dynamically managed subscribers.
#[derive(Clone)]
pub enum SubscriberStore {
    Redis {
        conn: ConnectionManager,
        key: String,
    },
    Memory(Arc<MemoryStore>),
}

/// Process-local subscriber set.
#[derive(Default)]
pub struct MemoryStore {
    chats: RwLock<BTreeSet<ChatId>>,
    offline: AtomicBool,
}

impl MemoryStore {
    fn check(&self) -> Result<(), AppError> {
        if self.offline.load(Ordering::Acquire) {
            return Err(AppError::Internal("subscriber store offline".to_string()));
        }
        Ok(())
    }
}

impl SubscriberStore {
    pub fn redis(conn: ConnectionManager, key: impl Into<String>) -> Self {
        SubscriberStore::Redis {
            conn,
            key: key.into(),
        }
    }

    pub fn memory() -> Self {
        SubscriberStore::Memory(Arc::new(MemoryStore::default()))
    }

    /// Make every call on an in-memory store fail until switched back, the way
    /// an unreachable Redis would. No effect on the Redis store.
    pub fn set_offline(&self, offline: bool) {
        if let SubscriberStore::Memory(store) = self {
            store.offline.store(offline, Ordering::Release);
        }
    }

    async fn add(&self, chat: ChatId) -> Result<bool, AppError> {
        match self {
            SubscriberStore::Redis { conn, key } => {
                let mut conn = conn.clone();
                let added: i64 = conn.sadd(key, chat.0).await?;
                Ok(added > 0)
            }
            SubscriberStore::Memory(store) => {
                store.check()?;
                Ok(store.chats.write().await.insert(chat))
            }
        }
    }

    async fn remove(&self, chat: ChatId) -> Result<bool, AppError> {
        match self {
            SubscriberStore::Redis { conn, key } => {
                let mut conn = conn.clone();
                let removed: i64 = conn.srem(key, chat.0).await?;
                Ok(removed > 0)
            }
            SubscriberStore::Memory(store) => {
                store.check()?;
                Ok(store.chats.write().await.remove(&chat))
            }
        }
    }

    async fn contains(&self, chat: ChatId) -> Result<bool, AppError> {
        match self {
            SubscriberStore::Redis { conn, key } => {
                let mut conn = conn.clone();
                Ok(conn.sismember(key, chat.0).await?)
            }
            SubscriberStore::Memory(store) => {
                store.check()?;
                Ok(store.chats.read().await.contains(&chat))
            }
        }
    }

    async fn list_all(&self) -> Result<BTreeSet<ChatId>, AppError> {
        match self {
            SubscriberStore::Redis { conn, key } => {
                let mut conn = conn.clone();
                let members: Vec<i64> = conn.smembers(key).await?;
                Ok(members.into_iter().map(ChatId).collect())
            }
            SubscriberStore::Memory(store) => {
                store.check()?;
                Ok(store.chats.read().await.clone())
            }
        }
    }
}

/// The set of chats a broadcast fans out to.
#[derive(Clone)]
pub enum RecipientDirectory {
    Subscribers(SubscriberStore),
    Fixed(ChatId),
}

impl RecipientDirectory {
    /// Whether chats can join and leave at runtime.
    pub fn is_dynamic(&self) -> bool {
        matches!(self, RecipientDirectory::Subscribers(_))
    }

    /// Add a subscriber. Returns `true` if it was not present before.
    ///
    /// A fixed directory never changes; this returns `false` for it.
    pub async fn add(&self, chat: ChatId) -> Result<bool, AppError> {
        match self {
            RecipientDirectory::Subscribers(store) => {
                let added = store.add(chat).await?;
                if added {
                    tracing::info!(chat_id = %chat, "Subscriber added");
                }
                Ok(added)
            }
            RecipientDirectory::Fixed(_) => Ok(false),
        }
    }

    /// Remove a subscriber. Returns `true` if it was present.
    pub async fn remove(&self, chat: ChatId) -> Result<bool, AppError> {
        match self {
            RecipientDirectory::Subscribers(store) => {
                let removed = store.remove(chat).await?;
                if removed {
                    tracing::info!(chat_id = %chat, "Subscriber removed");
                }
                Ok(removed)
            }
            RecipientDirectory::Fixed(_) => Ok(false),
        }
    }

    pub async fn contains(&self, chat: ChatId) -> Result<bool, AppError> {
        match self {
            RecipientDirectory::Subscribers(store) => store.contains(chat).await,
            RecipientDirectory::Fixed(fixed) => Ok(*fixed == chat),
        }
    }

    /// Current recipients. An empty set is a valid answer.
    pub async fn list_all(&self) -> Result<BTreeSet<ChatId>, AppError> {
        match self {
            RecipientDirectory::Subscribers(store) => store.list_all().await,
            RecipientDirectory::Fixed(fixed) => Ok(BTreeSet::from([*fixed])),
        }
    }
}
