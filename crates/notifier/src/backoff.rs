//! Capped retry schedule for failed deliveries.
//!
//! Retries follow a fixed ascending table instead of unbounded exponential
//! growth, so the worst-case retry cadence of a stuck message is known up front.

use std::time::Duration;

use relay_common::error::AppError;

/// Default wait before retry N (1-based): 1s, 5s, 30s, 1m, 5m, 15m, 1h.
pub const DEFAULT_SCHEDULE: [Duration; 7] = [
    Duration::from_secs(1),
    Duration::from_secs(5),
    Duration::from_secs(30),
    Duration::from_secs(60),
    Duration::from_secs(5 * 60),
    Duration::from_secs(15 * 60),
    Duration::from_secs(60 * 60),
];

/// Maps a failed-attempt count to the wait before the next attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    schedule: Vec<Duration>,
}

impl BackoffPolicy {
    /// Build a policy from a custom table. The table must be non-empty and
    /// non-decreasing.
    pub fn new(schedule: Vec<Duration>) -> Result<Self, AppError> {
        if schedule.is_empty() {
            return Err(AppError::Config("backoff schedule must not be empty".to_string()));
        }
        if schedule.windows(2).any(|w| w[1] < w[0]) {
            return Err(AppError::Config(
                "backoff schedule must be non-decreasing".to_string(),
            ));
        }
        Ok(Self { schedule })
    }

    /// Wait required after `attempts` failures. Zero for a message that never failed;
    /// capped at the last table entry.
    pub fn delay(&self, attempts: u32) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }
        let index = (attempts as usize - 1).min(self.schedule.len() - 1);
        self.schedule[index]
    }

    /// Largest delay this policy will ever return.
    pub fn max_delay(&self) -> Duration {
        self.schedule[self.schedule.len() - 1]
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            schedule: DEFAULT_SCHEDULE.to_vec(),
        }
    }
}
