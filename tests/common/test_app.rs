//! Test application setup utilities
//!
//! Builds the real router over an in-memory [`MockTenant`].

use std::sync::Arc;

use axum::{body::Body, body::Bytes, http::Request, Router};
use tower::ServiceExt;

use intune_assignment_checker::{
    api,
    config::{AppConfig, CacheConfig, GraphConfig},
    AppState,
};

use super::mocks::MockTenant;

/// Test application wrapper for integration testing
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub tenant: MockTenant,
}

impl TestApp {
    /// Test application over the given tenant
    pub fn new(tenant: MockTenant) -> Self {
        Self::with_config(tenant, test_config())
    }

    /// Test application with custom configuration
    pub fn with_config(tenant: MockTenant, config: AppConfig) -> Self {
        let source = Arc::new(tenant.clone());
        let state = AppState::new(config, source.clone(), source.clone(), source);
        let router = api::create_router(state.clone());

        Self {
            router,
            state,
            tenant,
        }
    }

    /// Make a GET request to the test application
    pub async fn get(&self, uri: &str) -> TestResponse {
        self.request(
            Request::builder()
                .method("GET")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// Make a POST request with JSON body
    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> TestResponse {
        self.request(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// Make a DELETE request
    pub async fn delete(&self, uri: &str) -> TestResponse {
        self.request(
            Request::builder()
                .method("DELETE")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// Make an arbitrary request
    pub async fn request(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read response body");

        TestResponse {
            status,
            headers,
            body,
        }
    }
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: axum::http::StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    /// Get the response body as a string
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    /// Parse the response body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.body).expect("Failed to parse response as JSON")
    }

    /// Assert the response status
    pub fn assert_status(&self, expected: axum::http::StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {}, got {}. Body: {}",
            expected,
            self.status,
            self.text()
        );
        self
    }

    /// Assert the response status is OK (200)
    pub fn assert_ok(&self) -> &Self {
        self.assert_status(axum::http::StatusCode::OK)
    }

    /// Assert the response status is Bad Request (400)
    pub fn assert_bad_request(&self) -> &Self {
        self.assert_status(axum::http::StatusCode::BAD_REQUEST)
    }

    /// Assert the response status is Not Found (404)
    pub fn assert_not_found(&self) -> &Self {
        self.assert_status(axum::http::StatusCode::NOT_FOUND)
    }
}

/// Configuration with a static token and caching on
pub fn test_config() -> AppConfig {
    AppConfig {
        graph: GraphConfig {
            access_token: Some("test-token".to_string()),
            ..GraphConfig::default()
        },
        cache: CacheConfig {
            enabled: true,
            ..CacheConfig::default()
        },
        ..AppConfig::default()
    }
}
