pub mod health;
pub mod metrics;
pub mod notify;
pub mod queue;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::Router;

use relay_common::error::AppError;

use crate::state::AppState;

/// Build the complete API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(notify::router())
        .merge(metrics::router())
        .merge(queue::router())
        .with_state(state)
}

/// Unwrap a JSON body, turning axum's rejection into a 400 with our error shape.
pub(crate) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))
}
