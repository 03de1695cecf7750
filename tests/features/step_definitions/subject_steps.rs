//! Single-subject assignment step definitions

use cucumber::{then, when};
use serde_json::Value;

use crate::features::support::TestWorld;

#[when(expr = "I view assignments for {word} {string}")]
async fn view_assignments(world: &mut TestWorld, subject_type: String, id: String) {
    world
        .get(&format!("/api/v1/subjects/{}/{}/assignments", subject_type, id))
        .await;
}

#[when(expr = "I search for {word} {string}")]
async fn search(world: &mut TestWorld, subject_type: String, query: String) {
    world
        .get(&format!(
            "/api/v1/subjects/{}/search?q={}",
            subject_type,
            urlencoding::encode(&query)
        ))
        .await;
}

fn routes_with(body: &Value, policy_id: &str) -> Vec<Value> {
    body["routes"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|r| {
            r["policies"]
                .as_array()
                .unwrap()
                .iter()
                .any(|p| p["id"] == policy_id)
        })
        .cloned()
        .collect()
}

#[then(expr = "policy {string} should be reached via {string}")]
async fn reached_via(world: &mut TestWorld, policy_id: String, via: String) {
    let routes = routes_with(world.body(), &policy_id);
    assert!(
        routes.iter().any(|r| r["via"] == via.as_str()),
        "routes for {}: {:?}",
        policy_id,
        routes
    );
}

#[then(expr = "policy {string} should be excluded")]
async fn excluded(world: &mut TestWorld, policy_id: String) {
    assert_eq!(world.body()["presence"][&policy_id]["excluded"], true);
}

#[then(expr = "policy {string} should not be present")]
async fn not_present(world: &mut TestWorld, policy_id: String) {
    assert!(routes_with(world.body(), &policy_id).is_empty());
    assert!(world.body()["presence"].get(&policy_id).is_none());
}

#[then(expr = "the search should return {int} result(s)")]
async fn search_results(world: &mut TestWorld, count: usize) {
    assert_eq!(world.body().as_array().unwrap().len(), count);
}
