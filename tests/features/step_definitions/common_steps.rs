//! Common step definitions used across features

use cucumber::{given, then};

use crate::features::support::TestWorld;

#[given("the reference tenant")]
async fn reference_tenant(world: &mut TestWorld) {
    world.use_reference_tenant();
}

#[given(expr = "the {string} source is unavailable")]
async fn source_unavailable(world: &mut TestWorld, label: String) {
    world.tenant.fail_source(TestWorld::source_by_label(&label));
}

#[given(expr = "the settings of policy {string} cannot be fetched")]
async fn settings_unavailable(world: &mut TestWorld, policy_id: String) {
    world.tenant.fail_config(&policy_id);
}

#[then(expr = "the response status should be {int}")]
async fn response_status(world: &mut TestWorld, status: u16) {
    if let Some(response) = &world.last_response {
        assert_eq!(response.status, status, "body: {}", response.body);
    } else {
        panic!("No response available");
    }
}

#[then(expr = "the response should contain an error {string}")]
async fn response_contains_error(world: &mut TestWorld, error: String) {
    assert_eq!(world.body()["error"], error.as_str());
}
