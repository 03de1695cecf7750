//! Comparison step definitions

use cucumber::{then, when};
use serde_json::{json, Value};

use crate::features::support::TestWorld;

async fn compare(world: &mut TestWorld, subjects: Value, settings: bool) {
    world
        .post(
            "/api/v1/compare",
            json!({"subjects": subjects, "includeSettingsDiff": settings}),
        )
        .await;
}

#[when(expr = "I compare {word} {string} with {word} {string}")]
async fn compare_two(world: &mut TestWorld, t1: String, id1: String, t2: String, id2: String) {
    let subjects = json!([{"type": t1, "id": id1}, {"type": t2, "id": id2}]);
    compare(world, subjects, false).await;
}

#[when(expr = "I compare {word} {string} with {word} {string} including settings")]
async fn compare_two_with_settings(
    world: &mut TestWorld,
    t1: String,
    id1: String,
    t2: String,
    id2: String,
) {
    let subjects = json!([{"type": t1, "id": id1}, {"type": t2, "id": id2}]);
    compare(world, subjects, true).await;
}

#[when(expr = "I compare only {word} {string}")]
async fn compare_one(world: &mut TestWorld, t: String, id: String) {
    compare(world, json!([{"type": t, "id": id}]), false).await;
}

fn bucket_of(body: &Value, policy_id: &str) -> Option<&'static str> {
    for table in ["policies", "apps"] {
        for bucket in ["common", "different"] {
            if body[table][bucket]
                .as_array()
                .unwrap()
                .iter()
                .any(|r| r["policyId"] == policy_id)
            {
                return Some(bucket);
            }
        }
    }
    None
}

#[then(expr = "policy {string} should be common")]
async fn common(world: &mut TestWorld, policy_id: String) {
    assert_eq!(bucket_of(world.body(), &policy_id), Some("common"));
}

#[then(expr = "policy {string} should differ")]
async fn differ(world: &mut TestWorld, policy_id: String) {
    assert_eq!(bucket_of(world.body(), &policy_id), Some("different"));
}

#[then(expr = "policy {string} should not be compared")]
async fn not_compared(world: &mut TestWorld, policy_id: String) {
    assert_eq!(bucket_of(world.body(), &policy_id), None);
}

#[then(expr = "{string} should be excluded from {string}")]
async fn subject_excluded(world: &mut TestWorld, subject: String, policy_id: String) {
    let presence = &world.body()["perSubjectPresence"][&subject][&policy_id];
    assert_eq!(presence["excluded"], true);
}

#[then(expr = "setting {string} should be {string} for {string}")]
async fn setting_value(world: &mut TestWorld, name: String, value: String, subject: String) {
    let row = world.body()["settingsDiff"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["name"] == name.as_str())
        .unwrap_or_else(|| panic!("setting {} not in diff", name))
        .clone();
    assert_eq!(row["perSubject"][&subject]["value"], value.as_str());
}
