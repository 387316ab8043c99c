//! Shared-secret guard for the ingress routes.
//!
//! When `API_KEY` is configured, every `/api/*` request must carry a matching
//! `X-API-Key` header. With no key configured the ingress is open.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use relay_common::error::AppError;

use crate::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Marker extractor: present in a handler's arguments means the caller passed
/// the API key check.
///
/// ```ignore
/// async fn handler(_auth: ApiKey, State(state): State<AppState>) -> impl IntoResponse {
///     // only reached with a valid key, or when no key is configured
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ApiKey;

/// Byte-wise comparison that does not stop at the first mismatch.
fn keys_match(expected: &str, provided: &str) -> bool {
    let (a, b) = (expected.as_bytes(), provided.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

impl FromRequestParts<AppState> for ApiKey {
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let expected = state.config.api_key.clone();

        let provided = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        async move {
            let Some(expected) = expected else {
                return Ok(ApiKey);
            };

            match provided {
                Some(key) if keys_match(&expected, &key) => Ok(ApiKey),
                Some(_) => {
                    tracing::warn!("Rejected request with invalid API key");
                    Err(AppError::Auth("Invalid API key".to_string()))
                }
                None => Err(AppError::Auth(
                    "Missing API key. Use 'X-API-Key: <key>'".to_string(),
                )),
            }
        }
    }
}
