//! Health check endpoints
//!
//! Provides health check endpoints for monitoring and load balancers.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::services::CacheServiceStats;
use crate::AppState;

/// Basic health response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Detailed health response with component status
#[derive(Serialize)]
pub struct DetailedHealthResponse {
    pub status: String,
    pub version: String,
    pub components: ComponentHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheServiceStats>,
    /// Generation of the most recent comparison run
    pub compare_generation: u64,
}

/// Health status of individual components
#[derive(Serialize)]
pub struct ComponentHealth {
    pub graph: ComponentStatus,
    pub cache: ComponentStatus,
}

/// Status of a single component
#[derive(Serialize)]
pub struct ComponentStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentStatus {
    fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            message: None,
        }
    }

    fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: "unhealthy".to_string(),
            message: Some(message.into()),
        }
    }

    fn not_configured() -> Self {
        Self {
            status: "not_configured".to_string(),
            message: None,
        }
    }
}

/// Graph is usable once a token source is configured; no request is made
fn graph_status(state: &AppState) -> ComponentStatus {
    let graph = &state.config.graph;
    if graph.has_static_token() || graph.has_client_credentials() {
        ComponentStatus::healthy()
    } else {
        ComponentStatus::unhealthy("no Graph credentials configured")
    }
}

/// Simple health check endpoint (for load balancers)
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Detailed health check endpoint
///
/// Returns 503 when Graph credentials are missing.
pub async fn health_check_detailed(
    State(state): State<AppState>,
) -> (StatusCode, Json<DetailedHealthResponse>) {
    let graph = graph_status(&state);
    let cache = if state.caches.is_enabled() {
        ComponentStatus::healthy()
    } else {
        ComponentStatus::not_configured()
    };

    let overall_healthy = graph.status == "healthy";
    let status_code = if overall_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = DetailedHealthResponse {
        status: if overall_healthy {
            "healthy".to_string()
        } else {
            "unhealthy".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        components: ComponentHealth { graph, cache },
        cache: state.caches.stats().await,
        compare_generation: state.session.current_generation(),
    };

    (status_code, Json(response))
}

/// Liveness check
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Readiness check: ready once Graph credentials are present
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match graph_status(&state).status.as_str() {
        "healthy" => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    }
}
