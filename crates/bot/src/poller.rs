//! Long-poll ingestion of bot updates.
//!
//! Each update is handled once: the offset moves past it after its handler
//! runs, whether or not the handler failed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use relay_notifier::transport::{ChatTransport, TransportError, Update};

use crate::handler::CommandHandler;

#[derive(Debug, Clone, Copy)]
pub struct PollerConfig {
    /// Long-poll timeout passed to `getUpdates`.
    pub timeout: Duration,
    /// Pause after a failed poll before trying again.
    pub cooldown: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            cooldown: Duration::from_secs(5),
        }
    }
}

/// Long-poll ingestion loop. Owns the update offset.
pub struct UpdatePoller<T> {
    transport: Arc<T>,
    handler: CommandHandler<T>,
    offset: i64,
    config: PollerConfig,
}

impl<T: ChatTransport> UpdatePoller<T> {
    pub fn new(transport: Arc<T>, handler: CommandHandler<T>, config: PollerConfig) -> Self {
        Self {
            transport,
            handler,
            offset: 0,
            config,
        }
    }

    /// Resume from a known offset instead of 0.
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    /// Id of the next update this poller will accept.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Poll until `shutdown` flips or the transport rejects our credentials.
    ///
    /// An in-flight long-poll is abandoned on shutdown. Every other transport
    /// error cools down and re-polls with the same offset.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), TransportError> {
        tracing::info!(
            offset = self.offset,
            timeout_secs = self.config.timeout.as_secs(),
            "Update poller started"
        );

        let transport = Arc::clone(&self.transport);

        loop {
            if *shutdown.borrow() {
                break;
            }

            let result = tokio::select! {
                _ = shutdown.changed() => break,
                result = transport.get_updates(self.offset, self.config.timeout) => result,
            };

            match result {
                Ok(updates) => self.process_batch(updates).await,
                Err(e) if e.is_fatal() => {
                    tracing::error!(error = %e, "Update polling rejected, stopping poller");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        class = ?e.class(),
                        offset = self.offset,
                        cooldown_ms = self.config.cooldown.as_millis() as u64,
                        "Update poll failed, cooling down"
                    );
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(self.config.cooldown) => {}
                    }
                }
            }
        }

        tracing::info!(offset = self.offset, "Update poller stopped");
        Ok(())
    }

    /// Handle a batch in ascending id order, skipping anything below the offset.
    pub async fn process_batch(&mut self, mut updates: Vec<Update>) {
        updates.sort_by_key(|u| u.update_id);

        for update in updates {
            if update.update_id < self.offset {
                tracing::debug!(
                    update_id = update.update_id,
                    offset = self.offset,
                    "Skipping already handled update"
                );
                continue;
            }

            if let Err(e) = self.handler.handle(&update).await {
                tracing::warn!(
                    update_id = update.update_id,
                    error = %e,
                    "Failed to handle update"
                );
            }
            self.offset = update.update_id + 1;
        }
    }
}
