//! Shared application state for the Axum API server.

use std::sync::Arc;

use relay_bot::metrics::MetricsCache;
use relay_common::config::AppConfig;
use relay_notifier::queue::DeliveryQueue;
use relay_notifier::recipients::RecipientDirectory;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub queue: DeliveryQueue,
    pub metrics: MetricsCache,
    pub directory: RecipientDirectory,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(
        queue: DeliveryQueue,
        metrics: MetricsCache,
        directory: RecipientDirectory,
        config: AppConfig,
    ) -> Self {
        Self {
            queue,
            metrics,
            directory,
            config: Arc::new(config),
        }
    }
}
