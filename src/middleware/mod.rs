//! HTTP middleware
//!
//! Responses carry tenant assignment data, so nothing under the API is
//! cacheable. Long comparisons can optionally be bounded by a deadline.

use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::utils::AppError;

/// Mark every API response as non-cacheable
pub async fn api_cache_control_middleware(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));

    response
}

/// Abort a request that runs past the configured deadline
pub async fn request_timeout_middleware(
    State(limit): State<Duration>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let uri = request.uri().clone();
    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            warn!(uri = %uri, limit_secs = limit.as_secs(), "Request timed out");
            AppError::Network(format!("request exceeded {}s", limit.as_secs())).into_response()
        }
    }
}
