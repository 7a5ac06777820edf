//! Request middleware
//!
//! - request id propagation (`x-request-id` echoed, or generated)
//! - request logging
//! - per-route request metrics
//! - readiness gate for prediction routes

use axum::{
    extract::{MatchedPath, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Instant;

use super::AppState;
use crate::error::ApiError;
use crate::state::HealthState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Logs every request with method, uri, status and duration
///
/// The request id from `x-request-id` is reused when present, otherwise a
/// UUID is generated; either way it is echoed on the response.
pub async fn request_logging_middleware(mut request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let request_id = match request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        Some(id) => id.to_string(),
        None => {
            let id = uuid::Uuid::new_v4().to_string();
            if let Ok(value) = HeaderValue::from_str(&id) {
                request.headers_mut().insert(REQUEST_ID_HEADER, value);
            }
            id
        }
    };

    let start = Instant::now();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        "Request started"
    );

    let mut response = next.run(request).await;
    let duration = start.elapsed();

    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %response.status(),
        duration_ms = %duration.as_millis(),
        "Request completed"
    );

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

/// Counts requests by matched route, method and status
pub async fn metrics_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let method = request.method().clone();

    let response = next.run(request).await;

    state
        .metrics
        .scoring()
        .record_request(&endpoint, method.as_str(), response.status().as_u16());

    response
}

/// Refuses prediction routes with `503` until the instance is ready
///
/// Runs before the handler extracts the body, so an unready instance answers
/// the same way whatever was sent.
pub async fn readiness_gate(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    match state.health.state() {
        HealthState::Ready => next.run(request).await,
        other => ApiError::Unavailable(other).into_response(),
    }
}
