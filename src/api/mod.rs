//! API routes and handlers
//!
//! This module defines all API endpoints and their routing.

use std::time::Duration;

use axum::{routing::get, Router};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::middleware::{api_cache_control_middleware, request_timeout_middleware};
use crate::AppState;

mod compare;
mod health;
mod policies;
mod subjects;

pub use compare::{CompareRequest, SubjectInput};
pub use health::*;
pub use policies::{PolicyDetail, PolicyListResponse, PolicySummary};

/// All API routes, relative to `/api/v1`
pub fn routes() -> Router<AppState> {
    Router::new()
        // Health check endpoints
        .route("/health", get(health::health_check))
        .route("/health/detailed", get(health::health_check_detailed))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        // Policy inventory
        .nest("/policies", policies::routes())
        // Subject lookup, search and single-subject assignments
        .nest("/subjects", subjects::routes())
        // Multi-subject comparison
        .nest("/compare", compare::routes())
}

/// Build the full application router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    // Cache control wraps the timeout so timed-out responses are marked too
    let mut api = routes();
    if let Some(secs) = state.config.server.request_timeout_secs {
        api = api.layer(axum::middleware::from_fn_with_state(
            Duration::from_secs(secs),
            request_timeout_middleware,
        ));
    }
    let api = api.layer(axum::middleware::from_fn(api_cache_control_middleware));

    Router::new()
        .nest("/api/v1", api)
        .layer(CompressionLayer::new())
        .layer(trace_layer)
        .layer(cors)
        .with_state(state)
}
