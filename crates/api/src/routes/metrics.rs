//! Metrics snapshot ingress and readout.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use relay_bot::metrics::MetricCounters;
use relay_common::error::AppError;
use relay_common::types::{MessageKind, MessagePayload};

use crate::middleware::auth::ApiKey;
use crate::routes::json_body;
use crate::state::AppState;

const MAX_SOURCE_LEN: usize = 64;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/metrics", get(list_sources))
        .route(
            "/api/metrics/{source}",
            put(update_metrics).get(get_metrics),
        )
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateQuery {
    /// Also broadcast the new snapshot.
    #[serde(default)]
    pub report: bool,
}

/// Source names are short slugs: ASCII alphanumerics, `-`, `_` and `.`.
fn validate_source(source: &str) -> Result<(), AppError> {
    let valid = !source.is_empty()
        && source.len() <= MAX_SOURCE_LEN
        && source
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Invalid source '{}': use up to {} letters, digits, '-', '_' or '.'",
            source, MAX_SOURCE_LEN
        )))
    }
}

/// PUT /api/metrics/:source: Replace the snapshot for `source`.
async fn update_metrics(
    _auth: ApiKey,
    State(state): State<AppState>,
    Path(source): Path<String>,
    Query(query): Query<UpdateQuery>,
    body: Result<Json<MetricCounters>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    validate_source(&source)?;
    let counters = json_body(body)?;

    let snapshot = state.metrics.update(&source, counters).await;
    tracing::info!(source = %source, report = query.report, "Metrics snapshot updated");

    let report_id = if query.report {
        let text = state.metrics.format(&source).await;
        Some(
            state
                .queue
                .enqueue(MessageKind::MetricsReport, MessagePayload::html(text))
                .await,
        )
    } else {
        None
    };

    Ok(Json(json!({
        "snapshot": snapshot,
        "report_id": report_id
    })))
}

/// GET /api/metrics: Sources that have reported at least once, sorted.
async fn list_sources(_auth: ApiKey, State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "sources": state.metrics.sources().await }))
}

/// GET /api/metrics/:source: Latest snapshot and its rendered text.
async fn get_metrics(
    _auth: ApiKey,
    State(state): State<AppState>,
    Path(source): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    validate_source(&source)?;

    let snapshot = state.metrics.get(&source).await;
    let text = state.metrics.format(&source).await;

    Ok(Json(json!({
        "source": source,
        "snapshot": snapshot,
        "text": text
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_source() {
        assert!(validate_source("production").is_ok());
        assert!(validate_source("eu-west_1.prod").is_ok());
        assert!(validate_source("").is_err());
        assert!(validate_source("prod env").is_err());
        assert!(validate_source("<b>").is_err());
        assert!(validate_source(&"a".repeat(65)).is_err());
    }
}
