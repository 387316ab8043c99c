//! Delivery queue observability.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::middleware::auth::ApiKey;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/queue", get(queue_status))
}

/// GET /api/queue: Pending counts, retry limits and the most recent permanent drops.
async fn queue_status(_auth: ApiKey, State(state): State<AppState>) -> Json<serde_json::Value> {
    let status = state.queue.status().await;
    let recent_drops = state.queue.recent_drops().await;

    Json(json!({
        "status": status,
        "max_attempts": state.queue.max_attempts(),
        "max_backoff_secs": state.queue.backoff().max_delay().as_secs(),
        "recent_drops": recent_drops
    }))
}
