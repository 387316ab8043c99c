//! Notification ingress. Every route here enqueues and returns 202 without
//! waiting on the chat transport.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use relay_common::error::AppError;
use relay_common::types::{MessageKind, MessagePayload, ParseMode};

use crate::format::{ErrorReport, PipelineUpdate, render_error, render_pipeline};
use crate::middleware::auth::ApiKey;
use crate::routes::json_body;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/notify", post(notify))
        .route("/api/errors", post(report_error))
        .route("/api/pipelines", post(report_pipeline))
}

#[derive(Debug, Deserialize)]
pub struct NotifyParams {
    pub text: String,
    #[serde(default)]
    pub parse_mode: Option<ParseMode>,
    /// Show a link preview for the first URL in `text`.
    #[serde(default)]
    pub link_preview: bool,
}

fn accepted(id: Uuid) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::ACCEPTED,
        Json(json!({ "id": id, "status": "queued" })),
    )
}

fn require(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("'{}' must not be empty", field)));
    }
    Ok(())
}

/// POST /api/notify: Broadcast raw text.
async fn notify(
    _auth: ApiKey,
    State(state): State<AppState>,
    body: Result<Json<NotifyParams>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let params = json_body(body)?;
    require("text", &params.text)?;

    let payload =
        MessagePayload::new(params.text, params.parse_mode).with_preview(params.link_preview);

    let id = state.queue.enqueue(MessageKind::Notification, payload).await;
    tracing::info!(message_id = %id, "Notification accepted");
    Ok(accepted(id))
}

/// POST /api/errors: Broadcast a formatted error report.
async fn report_error(
    _auth: ApiKey,
    State(state): State<AppState>,
    body: Result<Json<ErrorReport>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let report = json_body(body)?;
    require("source", &report.source)?;
    require("message", &report.message)?;

    let payload = MessagePayload::html(render_error(&report));
    let id = state.queue.enqueue(MessageKind::Notification, payload).await;
    tracing::info!(message_id = %id, source = %report.source, "Error report accepted");
    Ok(accepted(id))
}

/// POST /api/pipelines: Broadcast a pipeline status change.
async fn report_pipeline(
    _auth: ApiKey,
    State(state): State<AppState>,
    body: Result<Json<PipelineUpdate>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let update = json_body(body)?;
    require("pipeline", &update.pipeline)?;

    let payload = MessagePayload::html(render_pipeline(&update));
    let id = state.queue.enqueue(MessageKind::Notification, payload).await;
    tracing::info!(
        message_id = %id,
        pipeline = %update.pipeline,
        status = %update.status,
        "Pipeline update accepted"
    );
    Ok(accepted(id))
}
