//! Latest metrics snapshot per source.
//!
//! Each source (e.g. `production`, `staging`) keeps exactly one snapshot, replaced
//! wholesale on every update. Snapshots live for the process lifetime.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use relay_common::types::escape_html;

/// Reply for a source that has never reported.
pub const NO_DATA_YET: &str = "📭 No metrics data yet.";

/// Counters reported by the upstream application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricCounters {
    pub users_total: u64,
    pub users_today: u64,
    pub sessions_total: u64,
    pub sessions_today: u64,
    pub pipelines_total: u64,
    pub pipelines_today: u64,
    pub errors_total: u64,
    pub errors_today: u64,
}

impl MetricCounters {
    /// `(icon, label, total, today)` rows in display order.
    fn rows(&self) -> [(&'static str, &'static str, u64, u64); 4] {
        [
            ("👤", "Users", self.users_total, self.users_today),
            ("🔗", "Sessions", self.sessions_total, self.sessions_today),
            ("⚙️", "Pipelines", self.pipelines_total, self.pipelines_today),
            ("🚨", "Errors", self.errors_total, self.errors_today),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub source: String,
    pub counters: MetricCounters,
    pub last_updated_at: DateTime<Utc>,
}

impl MetricsSnapshot {
    /// Deterministic HTML rendering of every counter plus the cadence note.
    pub fn render(&self, cadence_minutes: u64) -> String {
        let mut text = format!("📊 <b>Metrics · {}</b>\n\n", escape_html(&self.source));
        for (icon, label, total, today) in self.counters.rows() {
            text.push_str(&format!("{} {}: {} (+{} today)\n", icon, label, total, today));
        }
        text.push_str(&format!(
            "\n🕒 Last updated: {}\n<i>Updated every {} minutes.</i>",
            self.last_updated_at.format("%Y-%m-%d %H:%M:%S UTC"),
            cadence_minutes
        ));
        text
    }
}

/// Shared metrics cache. Cheap to clone.
#[derive(Clone)]
pub struct MetricsCache {
    snapshots: Arc<RwLock<HashMap<String, MetricsSnapshot>>>,
    cadence_minutes: u64,
}

impl MetricsCache {
    pub fn new(cadence_minutes: u64) -> Self {
        Self {
            snapshots: Arc::new(RwLock::new(HashMap::new())),
            cadence_minutes,
        }
    }

    /// Replace the snapshot for `source`.
    pub async fn update(&self, source: &str, counters: MetricCounters) -> MetricsSnapshot {
        self.update_at(source, counters, Utc::now()).await
    }

    pub async fn update_at(
        &self,
        source: &str,
        counters: MetricCounters,
        now: DateTime<Utc>,
    ) -> MetricsSnapshot {
        let snapshot = MetricsSnapshot {
            source: source.to_string(),
            counters,
            last_updated_at: now,
        };
        self.snapshots
            .write()
            .await
            .insert(source.to_string(), snapshot.clone());

        tracing::debug!(source, "Metrics snapshot replaced");
        snapshot
    }

    pub async fn get(&self, source: &str) -> Option<MetricsSnapshot> {
        self.snapshots.read().await.get(source).cloned()
    }

    /// Display text for `source`: [`NO_DATA_YET`] until the first update.
    pub async fn format(&self, source: &str) -> String {
        match self.get(source).await {
            Some(snapshot) => snapshot.render(self.cadence_minutes),
            None => NO_DATA_YET.to_string(),
        }
    }

    /// Sources with a snapshot, sorted.
    pub async fn sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = self.snapshots.read().await.keys().cloned().collect();
        sources.sort();
        sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn counters() -> MetricCounters {
        MetricCounters {
            users_total: 1200,
            users_today: 14,
            sessions_total: 5400,
            sessions_today: 230,
            pipelines_total: 310,
            pipelines_today: 9,
            errors_total: 27,
            errors_today: 2,
        }
    }

    #[tokio::test]
    async fn test_unknown_source_has_no_data() {
        let cache = MetricsCache::new(60);
        assert!(cache.get("production").await.is_none());
        assert_eq!(cache.format("production").await, NO_DATA_YET);
    }

    #[tokio::test]
    async fn test_format_contains_every_counter() {
        let cache = MetricsCache::new(15);
        let at = Utc.with_ymd_and_hms(2026, 10, 16, 8, 30, 0).unwrap();
        cache.update_at("production", counters(), at).await;

        let text = cache.format("production").await;
        for expected in [
            "Users: 1200 (+14 today)",
            "Sessions: 5400 (+230 today)",
            "Pipelines: 310 (+9 today)",
            "Errors: 27 (+2 today)",
            "Last updated: 2026-10-16 08:30:00 UTC",
            "Updated every 15 minutes.",
            "production",
        ] {
            assert!(text.contains(expected), "missing {:?} in {}", expected, text);
        }
    }

    #[tokio::test]
    async fn test_update_replaces_wholesale() {
        let cache = MetricsCache::new(60);
        cache.update("staging", counters()).await;
        cache
            .update(
                "staging",
                MetricCounters {
                    users_total: 1,
                    ..MetricCounters::default()
                },
            )
            .await;

        let snapshot = cache.get("staging").await.unwrap();
        assert_eq!(snapshot.counters.users_total, 1);
        assert_eq!(snapshot.counters.sessions_total, 0);
    }

    #[tokio::test]
    async fn test_identical_updates_store_identical_state() {
        let cache = MetricsCache::new(60);
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let first = cache.update_at("prod", counters(), at).await;
        let second = cache.update_at("prod", counters(), at).await;
        assert_eq!(first, second);
        assert_eq!(cache.format("prod").await, first.render(60));
    }

    #[tokio::test]
    async fn test_sources_are_independent() {
        let cache = MetricsCache::new(60);
        cache.update("b", counters()).await;
        cache.update("a", MetricCounters::default()).await;

        assert_eq!(cache.sources().await, vec!["a", "b"]);
        assert_eq!(cache.get("a").await.unwrap().counters.users_total, 0);
        assert_eq!(cache.get("b").await.unwrap().counters.users_total, 1200);
    }

    #[test]
    fn test_source_name_escaped() {
        let snapshot = MetricsSnapshot {
            source: "<script>".to_string(),
            counters: MetricCounters::default(),
            last_updated_at: Utc::now(),
        };
        assert!(snapshot.render(5).contains("&lt;script&gt;"));
    }

    #[test]
    fn test_counters_reject_unknown_fields() {
        let result: Result<MetricCounters, _> =
            serde_json::from_value(serde_json::json!({ "users_total": 1, "bogus": 2 }));
        assert!(result.is_err());
    }
}
