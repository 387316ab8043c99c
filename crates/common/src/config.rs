use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::types::ChatId;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Telegram bot token (required)
    pub telegram_bot_token: String,

    /// Base URL of the Telegram Bot API
    pub telegram_api_url: String,

    /// Fixed destination chat. When set, broadcasts go only here and
    /// subscriptions are disabled.
    pub telegram_chat_id: Option<ChatId>,

    /// Redis connection string (subscriber store)
    pub redis_url: String,

    /// Redis set key holding subscriber chat ids
    pub subscribers_key: String,

    /// HTTP listen port
    pub server_port: u16,

    /// Shared secret for the `X-API-Key` header. Unset means open ingress.
    pub api_key: Option<String>,

    /// Dispatcher periodic tick in milliseconds (default: 10000)
    pub dispatch_tick_ms: u64,

    /// Delay between consecutive outbound sends in milliseconds (default: 1000)
    pub dispatch_send_delay_ms: u64,

    /// Send attempts before a message is dropped (default: 10)
    pub delivery_max_attempts: u32,

    /// Server-side long-poll timeout for getUpdates in seconds (default: 30)
    pub poll_timeout_secs: u64,

    /// Pause after a failed poll in milliseconds (default: 5000)
    pub poll_cooldown_ms: u64,

    /// Per-request timeout for outbound API calls in seconds (default: 10)
    pub request_timeout_secs: u64,

    /// Metrics reporting cadence, shown under rendered snapshots (default: 60)
    pub metrics_cadence_minutes: u64,

    /// Source used by `/metrics` when no argument is given
    pub metrics_default_source: String,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let telegram_bot_token = lookup("TELEGRAM_BOT_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("TELEGRAM_BOT_TOKEN environment variable is required"))?;

        let telegram_chat_id = match lookup("TELEGRAM_CHAT_ID").filter(|v| !v.trim().is_empty()) {
            Some(raw) => Some(
                raw.trim()
                    .parse::<ChatId>()
                    .map_err(|_| anyhow::anyhow!("TELEGRAM_CHAT_ID must be a valid i64"))?,
            ),
            None => None,
        };

        let delivery_max_attempts: u32 = parse_or(&lookup, "DELIVERY_MAX_ATTEMPTS", 10)?;
        if delivery_max_attempts == 0 {
            anyhow::bail!("DELIVERY_MAX_ATTEMPTS must be at least 1");
        }

        Ok(Self {
            telegram_bot_token,
            telegram_api_url: lookup("TELEGRAM_API_URL")
                .unwrap_or_else(|| "https://api.telegram.org".to_string()),
            telegram_chat_id,
            redis_url: lookup("REDIS_URL").unwrap_or_else(|| "redis://localhost:6379".to_string()),
            subscribers_key: lookup("SUBSCRIBERS_KEY")
                .unwrap_or_else(|| "relay:subscribers".to_string()),
            server_port: parse_or(&lookup, "SERVER_PORT", 3000)?,
            api_key: lookup("API_KEY").filter(|k| !k.is_empty()),
            dispatch_tick_ms: parse_or(&lookup, "DISPATCH_TICK_MS", 10_000)?,
            dispatch_send_delay_ms: parse_or(&lookup, "DISPATCH_SEND_DELAY_MS", 1_000)?,
            delivery_max_attempts,
            poll_timeout_secs: parse_or(&lookup, "POLL_TIMEOUT_SECS", 30)?,
            poll_cooldown_ms: parse_or(&lookup, "POLL_COOLDOWN_MS", 5_000)?,
            request_timeout_secs: parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 10)?,
            metrics_cadence_minutes: parse_or(&lookup, "METRICS_CADENCE_MINUTES", 60)?,
            metrics_default_source: lookup("METRICS_DEFAULT_SOURCE")
                .unwrap_or_else(|| "production".to_string()),
        })
    }

    pub fn dispatch_tick(&self) -> Duration {
        Duration::from_millis(self.dispatch_tick_ms)
    }

    pub fn dispatch_send_delay(&self) -> Duration {
        Duration::from_millis(self.dispatch_send_delay_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn poll_cooldown(&self) -> Duration {
        Duration::from_millis(self.poll_cooldown_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            anyhow::anyhow!(
                "{} must be a valid {}",
                key,
                std::any::type_name::<T>()
            )
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_applied() {
        let config = AppConfig::from_lookup(lookup_from(&[("TELEGRAM_BOT_TOKEN", "123:abc")]))
            .unwrap();
        assert_eq!(config.telegram_api_url, "https://api.telegram.org");
        assert_eq!(config.telegram_chat_id, None);
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.delivery_max_attempts, 10);
        assert_eq!(config.dispatch_tick(), Duration::from_secs(10));
        assert_eq!(config.dispatch_send_delay(), Duration::from_secs(1));
        assert_eq!(config.poll_cooldown(), Duration::from_secs(5));
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_missing_token_is_fatal() {
        let err = AppConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(err.to_string().contains("TELEGRAM_BOT_TOKEN"));

        let err = AppConfig::from_lookup(lookup_from(&[("TELEGRAM_BOT_TOKEN", "  ")])).unwrap_err();
        assert!(err.to_string().contains("TELEGRAM_BOT_TOKEN"));
    }

    #[test]
    fn test_fixed_chat_id_parsed() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("TELEGRAM_CHAT_ID", "-100200300"),
        ]))
        .unwrap();
        assert_eq!(config.telegram_chat_id, Some(ChatId(-100200300)));
    }

    #[test]
    fn test_invalid_number_names_variable() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("DISPATCH_TICK_MS", "soon"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("DISPATCH_TICK_MS"));
    }

    #[test]
    fn test_zero_max_attempts_rejected() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("DELIVERY_MAX_ATTEMPTS", "0"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("DELIVERY_MAX_ATTEMPTS"));
    }
}
