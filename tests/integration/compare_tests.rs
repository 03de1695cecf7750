//! Comparison API tests

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::{json, Value};

use crate::common::{
    reference_tenant, test_config, TestApp, ALICE, BOB, LAPTOP, LAPTOP_DIRECTORY_ID, PILOT,
};

fn alice_and_bob(include_settings_diff: bool) -> Value {
    json!({
        "subjects": [
            {"type": "user", "id": ALICE},
            {"type": "user", "id": BOB}
        ],
        "includeSettingsDiff": include_settings_diff
    })
}

fn rows<'a>(json: &'a Value, table: &str, bucket: &str) -> &'a Vec<Value> {
    json[table][bucket].as_array().unwrap()
}

fn row<'a>(json: &'a Value, table: &str, policy_id: &str) -> &'a Value {
    ["common", "different"]
        .iter()
        .flat_map(|bucket| rows(json, table, bucket))
        .find(|r| r["policyId"] == policy_id)
        .unwrap_or_else(|| panic!("no row for {}", policy_id))
}

#[tokio::test]
async fn test_compare_two_users() {
    let app = TestApp::new(reference_tenant());
    let response = app.post_json("/api/v1/compare", alice_and_bob(false)).await;

    response.assert_ok();
    let json: Value = response.json();
    let alice = format!("user:{}", ALICE);
    let bob = format!("user:{}", BOB);

    // Present for both, even though bob is excluded
    let baseline = row(&json, "policies", "p-baseline");
    assert!(rows(&json, "policies", "common")
        .iter()
        .any(|r| r["policyId"] == "p-baseline"));
    assert_eq!(baseline["perSubject"][&alice]["excluded"], false);
    assert_eq!(baseline["perSubject"][&bob]["excluded"], true);
    assert_eq!(
        baseline["perSubject"][&bob]["reasons"],
        json!(["All Users", "Excluded via Contractors"])
    );

    let finance = row(&json, "policies", "p-finance");
    assert_eq!(finance["perSubject"][&alice]["state"], "present");
    assert_eq!(finance["perSubject"][&bob]["state"], "notPresent");

    // Apps are kept apart from policies
    let portal = row(&json, "apps", "app-portal");
    assert_eq!(portal["perSubject"][&alice]["reasons"], json!(["Pilot Ring"]));

    // Policies nobody receives are not rows
    assert!(rows(&json, "policies", "different")
        .iter()
        .all(|r| r["policyId"] != "p-unassigned"));
    assert!(json.get("settingsDiff").is_none());
}

#[tokio::test]
async fn test_compare_with_settings_diff() {
    let app = TestApp::new(reference_tenant());
    let response = app.post_json("/api/v1/compare", alice_and_bob(true)).await;

    response.assert_ok();
    let json: Value = response.json();
    let diff = json["settingsDiff"].as_array().unwrap();
    let alice = format!("user:{}", ALICE);
    let bob = format!("user:{}", BOB);

    let names: Vec<&str> = diff.iter().map(|r| r["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["Firewall Enabled", "Screen Lock Timeout", "USB Storage"]);

    let timeout = &diff[1];
    assert_eq!(timeout["perSubject"][&alice]["value"], "300 | 60");
    assert_eq!(
        timeout["perSubject"][&alice]["sources"],
        json!(["Finance Hardening", "Security Baseline"])
    );
    assert_eq!(timeout["perSubject"][&bob]["value"], "—");
}

#[tokio::test]
async fn test_settings_are_fetched_once_per_policy() {
    let app = TestApp::new(reference_tenant());
    let body = json!({
        "subjects": [
            {"type": "user", "id": ALICE},
            {"type": "group", "id": "g-finance"}
        ],
        "includeSettingsDiff": true
    });

    app.post_json("/api/v1/compare", body.clone()).await.assert_ok();
    app.post_json("/api/v1/compare", body).await.assert_ok();

    // p-baseline and p-finance, memoized across runs
    assert_eq!(
        app.tenant
            .config_calls
            .load(std::sync::atomic::Ordering::SeqCst),
        2
    );
}

#[tokio::test]
async fn test_failed_settings_fetch_fails_the_comparison() {
    let tenant = reference_tenant();
    tenant.fail_config("p-finance");
    let app = TestApp::new(tenant);

    let response = app.post_json("/api/v1/compare", alice_and_bob(true)).await;
    response.assert_status(StatusCode::BAD_GATEWAY);
    let json: Value = response.json();
    assert_eq!(json["error"], "partial_data");
    assert_eq!(json["details"]["failed"], json!(["p-finance"]));

    let latest: Value = app.get("/api/v1/compare/latest").await.json();
    assert_eq!(latest["status"], "error");
    assert_eq!(latest["error_type"], "partial_data");
}

#[tokio::test]
async fn test_membership_failure_is_not_an_empty_result() {
    let tenant = reference_tenant();
    tenant.fail_memberships(LAPTOP_DIRECTORY_ID);
    let app = TestApp::new(tenant);

    let body = json!({"subjects": [
        {"type": "user", "id": ALICE},
        {"type": "device", "id": LAPTOP}
    ]});
    let response = app.post_json("/api/v1/compare", body).await;
    response.assert_status(StatusCode::BAD_GATEWAY);
    let json: Value = response.json();
    assert_eq!(json["error"], "network_error");
    assert!(json["message"].as_str().unwrap().contains(LAPTOP));
}

#[tokio::test]
async fn test_group_subject_reasons() {
    let app = TestApp::new(reference_tenant());
    let body = json!({"subjects": [
        {"type": "group", "id": PILOT},
        {"type": "user", "id": BOB}
    ]});

    let response = app.post_json("/api/v1/compare", body).await;
    response.assert_ok();
    let json: Value = response.json();
    let portal = row(&json, "apps", "app-portal");
    assert_eq!(
        portal["perSubject"][&format!("group:{}", PILOT)]["reasons"],
        json!(["Direct group assignment"])
    );
}

#[tokio::test]
async fn test_compare_request_validation() {
    let app = TestApp::new(reference_tenant());

    let one = json!({"subjects": [{"type": "user", "id": ALICE}]});
    app.post_json("/api/v1/compare", one)
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    let duplicate = json!({"subjects": [
        {"type": "user", "id": ALICE},
        {"type": "user", "id": ALICE}
    ]});
    app.post_json("/api/v1/compare", duplicate)
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    let unknown = json!({"subjects": [
        {"type": "user", "id": ALICE},
        {"type": "user", "id": "ghost"}
    ]});
    app.post_json("/api/v1/compare", unknown)
        .await
        .assert_not_found();
}

#[tokio::test]
async fn test_latest_comparison_lifecycle() {
    let app = TestApp::new(reference_tenant());

    let idle: Value = app.get("/api/v1/compare/latest").await.json();
    assert_eq!(idle["status"], "idle");

    app.post_json("/api/v1/compare", alice_and_bob(false))
        .await
        .assert_ok();
    let done: Value = app.get("/api/v1/compare/latest").await.json();
    assert_eq!(done["status"], "success");
    assert_eq!(done["generation"], 1);
    assert_eq!(done["result"]["subjects"].as_array().unwrap().len(), 2);

    app.delete("/api/v1/compare/latest")
        .await
        .assert_status(StatusCode::NO_CONTENT);
    let cleared: Value = app.get("/api/v1/compare/latest").await.json();
    assert_eq!(cleared["status"], "idle");
}

#[tokio::test]
async fn test_timed_out_comparison_is_recorded_as_cancelled() {
    let tenant = reference_tenant();
    tenant.delay_memberships(Duration::from_secs(30));
    let mut config = test_config();
    config.server.request_timeout_secs = Some(1);
    let app = TestApp::with_config(tenant, config);

    let response = app.post_json("/api/v1/compare", alice_and_bob(false)).await;
    response.assert_status(StatusCode::BAD_GATEWAY);
    assert_eq!(
        response.headers.get("cache-control").unwrap(),
        "no-store, no-cache, must-revalidate, private"
    );
    let json: Value = response.json();
    assert_eq!(json["error"], "network_error");

    let mut latest: Value = app.get("/api/v1/compare/latest").await.json();
    for _ in 0..50 {
        if latest["status"] != "loading" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        latest = app.get("/api/v1/compare/latest").await.json();
    }
    assert_eq!(latest["status"], "error");
    assert_eq!(latest["error_type"], "cancelled");
}
