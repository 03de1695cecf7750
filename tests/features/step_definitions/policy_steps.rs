//! Policy inventory step definitions

use cucumber::{then, when};

use crate::features::support::TestWorld;

#[when("I list policies")]
async fn list_policies(world: &mut TestWorld) {
    world.get("/api/v1/policies").await;
}

#[when(expr = "I list {string} policies")]
async fn list_policies_in_category(world: &mut TestWorld, category: String) {
    let uri = format!(
        "/api/v1/policies?category={}",
        urlencoding::encode(&category)
    );
    world.get(&uri).await;
}

#[then(expr = "the inventory should contain {int} policies")]
async fn inventory_size(world: &mut TestWorld, count: u64) {
    assert_eq!(world.body()["total"], count);
}

#[then(expr = "the failed sources should include {string}")]
async fn failed_source(world: &mut TestWorld, label: String) {
    let failed = world.body()["failedSources"].as_array().unwrap();
    assert!(failed.iter().any(|f| f == label.as_str()), "failed: {:?}", failed);
}

#[then(expr = "policy {string} should be assigned to {string}")]
async fn assigned_to(world: &mut TestWorld, policy_id: String, target: String) {
    let policy = world.body()["policies"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["id"] == policy_id.as_str())
        .unwrap_or_else(|| panic!("policy {} not listed", policy_id));
    assert!(policy["assignedTo"]
        .as_array()
        .unwrap()
        .iter()
        .any(|t| t == target.as_str()));
}
