//! Rate-limited, single-flight delivery dispatcher.
//!
//! Drains the [`DeliveryQueue`] on a fixed tick and whenever a producer enqueues.
//! At most one pass runs at a time; a trigger that arrives mid-pass is a no-op,
//! and anything enqueued meanwhile is picked up by the next pass.
//!
//! Per pass:
//! 1. Resolve recipients (fresh read). Directory failure or no recipients → nothing sent.
//! 2. For each ready message, send to every recipient that has not accepted it yet.
//! 3. Space consecutive transport calls by a fixed delay.
//! 4. All recipients done → success; any recipient failed → failure and retry later.
//!
//! A rate-limit answer ends the pass and pauses dispatch for the transport's
//! `retry_after` (one tick when it gives none). Shutdown abandons a running pass.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::time::{Instant, MissedTickBehavior};

use crate::queue::{DeliveryQueue, FailureOutcome};
use crate::recipients::RecipientDirectory;
use crate::transport::{ChatTransport, TransportError};

/// Dispatcher timing.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Periodic retry tick.
    pub tick: Duration,
    /// Pause between consecutive outbound sends.
    pub send_delay: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(10),
            send_delay: Duration::from_secs(1),
        }
    }
}

/// Outcome of one dispatch pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Another pass was already running; nothing was done.
    pub skipped: bool,
    /// Ready messages considered.
    pub attempted: usize,
    /// Messages fully delivered and removed.
    pub delivered: usize,
    /// Messages that failed and stay queued.
    pub retried: usize,
    /// Messages that hit the attempt ceiling.
    pub dropped: usize,
    /// Individual transport calls made.
    pub sends: usize,
    /// Dispatch is paused after a rate limit; nothing was done.
    pub cooling_down: bool,
}

impl PassReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    fn cooling_down() -> Self {
        Self {
            cooling_down: true,
            ..Self::default()
        }
    }
}

/// Clears the in-flight flag when a pass ends, however it ends.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Dispatcher<T> {
    queue: DeliveryQueue,
    directory: RecipientDirectory,
    transport: Arc<T>,
    config: DispatcherConfig,
    in_flight: AtomicBool,
    /// No pass sends before this instant.
    paused_until: Mutex<Option<Instant>>,
}

impl<T: ChatTransport> Dispatcher<T> {
    pub fn new(
        queue: DeliveryQueue,
        directory: RecipientDirectory,
        transport: Arc<T>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            queue,
            directory,
            transport,
            config,
            in_flight: AtomicBool::new(false),
            paused_until: Mutex::new(None),
        }
    }

    /// Run passes on every tick and every enqueue until `shutdown` flips to `true`.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            tick_ms = self.config.tick.as_millis() as u64,
            send_delay_ms = self.config.send_delay.as_millis() as u64,
            dynamic_recipients = self.directory.is_dynamic(),
            "Dispatcher started"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
                _ = self.queue.notified() => {}
            }

            tokio::select! {
                _ = self.run_pass() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Shutdown requested, abandoning dispatch pass");
                        break;
                    }
                }
            }
        }

        let status = self.queue.status().await;
        tracing::info!(
            undelivered = status.total_pending,
            "Dispatcher stopped"
        );
    }

    /// Execute one drain-and-send pass, unless one is already running.
    pub async fn run_pass(&self) -> PassReport {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Dispatch pass already in flight, skipping trigger");
            return PassReport::skipped();
        }
        let _guard = PassGuard(&self.in_flight);

        let paused_until = *self.paused_until.lock().await;
        if let Some(until) = paused_until
            && Instant::now() < until
        {
            tracing::debug!(
                remaining_ms = until.duration_since(Instant::now()).as_millis() as u64,
                "Transport cool-off in effect, skipping pass"
            );
            return PassReport::cooling_down();
        }

        let mut report = PassReport::default();

        let recipients = match self.directory.list_all().await {
            Ok(recipients) => recipients,
            Err(e) => {
                tracing::warn!(error = %e, "Recipient directory unavailable, deferring pass");
                return report;
            }
        };

        let ready = self.queue.drain().await;
        if ready.is_empty() {
            return report;
        }
        if recipients.is_empty() {
            tracing::debug!(ready = ready.len(), "No recipients, leaving messages queued");
            return report;
        }

        'messages: for message in ready {
            report.attempted += 1;
            let mut failed = false;
            let mut rate_limited = false;

            for chat in recipients.iter().filter(|c| !message.delivered_to.contains(*c)) {
                if report.sends > 0 && !self.config.send_delay.is_zero() {
                    tokio::time::sleep(self.config.send_delay).await;
                }
                report.sends += 1;

                match self.transport.send_message(*chat, &message.payload).await {
                    Ok(()) => {
                        self.queue.record_delivery(message.id, *chat).await;
                    }
                    Err(e) => {
                        tracing::warn!(
                            message_id = %message.id,
                            chat_id = %chat,
                            attempts = message.attempts,
                            error = %e,
                            class = ?e.class(),
                            "Send failed"
                        );
                        failed = true;
                        if let TransportError::RateLimited { retry_after } = e {
                            let pause = retry_after
                                .map(Duration::from_secs)
                                .unwrap_or(self.config.tick);
                            *self.paused_until.lock().await = Some(Instant::now() + pause);
                            tracing::warn!(
                                retry_after_secs = ?retry_after,
                                pause_ms = pause.as_millis() as u64,
                                "Transport rate limit hit, pausing dispatch"
                            );
                            rate_limited = true;
                            break;
                        }
                    }
                }
            }

            if failed {
                match self.queue.record_failure(message.id).await {
                    Some(FailureOutcome::Dropped { .. }) => report.dropped += 1,
                    Some(FailureOutcome::Retrying { .. }) => report.retried += 1,
                    None => {}
                }
            } else if self.queue.record_success(message.id).await {
                report.delivered += 1;
            }

            if rate_limited {
                break 'messages;
            }
        }

        if report.retried > 0 || report.dropped > 0 {
            tracing::info!(
                attempted = report.attempted,
                delivered = report.delivered,
                retried = report.retried,
                dropped = report.dropped,
                "Dispatch pass finished with failures"
            );
        } else {
            tracing::debug!(
                attempted = report.attempted,
                delivered = report.delivered,
                sends = report.sends,
                "Dispatch pass finished"
            );
        }

        report
    }
}
