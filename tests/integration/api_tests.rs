//! API integration tests
//!
//! Exercises the HTTP endpoints through the full router.

use axum::http::StatusCode;
use serde_json::Value;

use intune_assignment_checker::{config::AppConfig, models::SourceCollection};

use crate::common::{reference_tenant, MockError, TestApp, ALICE, BOB, KIOSK};

// ==================== Health ====================

#[tokio::test]
async fn test_health_endpoint_returns_ok() {
    let app = TestApp::new(reference_tenant());
    let response = app.get("/api/v1/health").await;

    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn test_detailed_health_reports_components() {
    let app = TestApp::new(reference_tenant());
    let response = app.get("/api/v1/health/detailed").await;

    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["components"]["graph"]["status"], "healthy");
    assert_eq!(json["components"]["cache"]["status"], "healthy");
    assert!(json.get("compare_generation").is_some());
}

#[tokio::test]
async fn test_readiness_requires_credentials() {
    let app = TestApp::with_config(reference_tenant(), AppConfig::default());
    app.get("/api/v1/health/ready")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
    app.get("/api/v1/health/live").await.assert_ok();
}

#[tokio::test]
async fn test_api_responses_are_not_cacheable() {
    let app = TestApp::new(reference_tenant());
    let response = app.get("/api/v1/health").await;
    assert_eq!(
        response.headers.get("cache-control").unwrap(),
        "no-store, no-cache, must-revalidate, private"
    );
}

// ==================== Policies ====================

#[tokio::test]
async fn test_list_policies() {
    let app = TestApp::new(reference_tenant());
    let response = app.get("/api/v1/policies").await;

    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["total"], 5);
    assert_eq!(json["failedSources"].as_array().unwrap().len(), 0);

    let finance = json["policies"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["id"] == "p-finance")
        .unwrap();
    assert_eq!(finance["category"], "Settings Catalog");
    assert_eq!(finance["assignmentStatus"], "Group");
    assert_eq!(finance["assignedTo"][0], "Finance");
}

#[tokio::test]
async fn test_list_policies_by_category() {
    let app = TestApp::new(reference_tenant());
    let response = app.get("/api/v1/policies?category=Compliance%20Policy").await;

    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["total"], 1);
    assert_eq!(json["policies"][0]["assignmentStatus"], "All Devices");
}

#[tokio::test]
async fn test_policy_summary() {
    let app = TestApp::new(reference_tenant());
    let response = app.get("/api/v1/policies/summary").await;

    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["total"], 5);
    assert_eq!(json["assigned"], 4);
    assert_eq!(json["unassigned"], 1);
    assert_eq!(json["coveragePercent"], 80);
    assert_eq!(json["byCategory"][0]["name"], "Settings Catalog");
    assert_eq!(json["byCategory"][0]["count"], 3);

    let top: Vec<&str> = json["topGroups"]
        .as_array()
        .unwrap()
        .iter()
        .map(|g| g["name"].as_str().unwrap())
        .collect();
    assert_eq!(top, vec!["Finance", "Pilot Ring"]);
}

#[tokio::test]
async fn test_failed_source_is_reported_not_hidden() {
    let tenant = reference_tenant();
    tenant.fail_source(SourceCollection::MobileApps);
    let app = TestApp::new(tenant);

    let response = app.get("/api/v1/policies").await;
    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["total"], 4);
    assert_eq!(json["failedSources"][0], "Applications");
}

#[tokio::test]
async fn test_total_outage_is_an_error() {
    let tenant = reference_tenant();
    tenant.set_error_mode(MockError::Network("throttled".into()));
    let app = TestApp::new(tenant);

    let response = app.get("/api/v1/policies").await;
    response.assert_status(StatusCode::BAD_GATEWAY);
    let json: Value = response.json();
    assert_eq!(json["error"], "partial_data");
    assert_eq!(json["details"]["failed"].as_array().unwrap().len(), 14);
}

#[tokio::test]
async fn test_inventory_is_cached_between_requests() {
    let app = TestApp::new(reference_tenant());
    app.get("/api/v1/policies").await.assert_ok();
    app.get("/api/v1/policies").await.assert_ok();
    assert_eq!(
        app.tenant
            .collection_calls
            .load(std::sync::atomic::Ordering::SeqCst),
        14
    );

    app.get("/api/v1/policies?refresh=true").await.assert_ok();
    assert_eq!(
        app.tenant
            .collection_calls
            .load(std::sync::atomic::Ordering::SeqCst),
        28
    );
}

#[tokio::test]
async fn test_get_policy_and_settings() {
    let app = TestApp::new(reference_tenant());

    let response = app.get("/api/v1/policies/p-baseline").await;
    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["name"], "Security Baseline");
    assert_eq!(json["assignmentStatus"], "All Users");
    assert_eq!(json["assignedTo"][0], "[Excluded] Contractors");

    let response = app.get("/api/v1/policies/p-baseline/settings").await;
    response.assert_ok();
    let items: Vec<Value> = response.json();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["name"], "Firewall Enabled");

    app.get("/api/v1/policies/nope").await.assert_not_found();
}

// ==================== Subjects ====================

#[tokio::test]
async fn test_describe_subject() {
    let app = TestApp::new(reference_tenant());

    let response = app.get(&format!("/api/v1/subjects/user/{}", ALICE)).await;
    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["type"], "user");
    assert_eq!(json["label"], "alice@contoso.com");

    app.get("/api/v1/subjects/user/ghost").await.assert_not_found();
    app.get("/api/v1/subjects/printer/p1").await.assert_bad_request();
}

#[tokio::test]
async fn test_search_subjects() {
    let app = TestApp::new(reference_tenant());

    let response = app.get("/api/v1/subjects/user/search?q=al").await;
    response.assert_ok();
    let results: Vec<Value> = response.json();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["id"], ALICE);

    let response = app.get("/api/v1/subjects/device/search?q=k").await;
    response.assert_ok();
    let results: Vec<Value> = response.json();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_user_assignments_are_grouped_by_route() {
    let app = TestApp::new(reference_tenant());

    let response = app
        .get(&format!("/api/v1/subjects/user/{}/assignments", ALICE))
        .await;
    response.assert_ok();
    let json: Value = response.json();

    let routes = json["routes"].as_array().unwrap();
    assert_eq!(routes[0]["via"], "All Users");
    assert_eq!(routes[0]["policies"][0]["id"], "p-baseline");

    let finance = routes.iter().find(|r| r["via"] == "Finance").unwrap();
    assert_eq!(finance["policies"][0]["id"], "p-finance");
    let pilot = routes.iter().find(|r| r["via"] == "Pilot Ring").unwrap();
    assert_eq!(pilot["policies"][0]["intent"], "required");

    assert_eq!(json["totalPolicies"], 3);
}

#[tokio::test]
async fn test_excluded_user_sees_exclusion_route() {
    let app = TestApp::new(reference_tenant());

    let response = app
        .get(&format!("/api/v1/subjects/user/{}/assignments", BOB))
        .await;
    response.assert_ok();
    let json: Value = response.json();

    let contractors = json["routes"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["via"] == "Contractors")
        .unwrap();
    assert_eq!(contractors["policies"][0]["intent"], "excluded");
    assert_eq!(json["presence"]["p-baseline"]["excluded"], true);
}

#[tokio::test]
async fn test_device_without_directory_identity_gets_only_all_devices() {
    let app = TestApp::new(reference_tenant());

    let response = app
        .get(&format!("/api/v1/subjects/device/{}/assignments", KIOSK))
        .await;
    response.assert_ok();
    let json: Value = response.json();

    let routes = json["routes"].as_array().unwrap();
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0]["via"], "All Devices");
    assert_eq!(routes[0]["policies"][0]["id"], "c-bitlocker");
}
