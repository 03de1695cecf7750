//! Test world for Cucumber scenarios

use std::fmt;

use cucumber::World;
use serde_json::Value;

use intune_assignment_checker::models::SourceCollection;

use crate::common::{reference_tenant, MockTenant, TestApp};

/// Test world that maintains state across scenario steps
#[derive(Default, World)]
pub struct TestWorld {
    /// Tenant the scenario runs against; the app is built lazily from it
    pub tenant: MockTenant,
    app: Option<TestApp>,
    /// Response from last API call
    pub last_response: Option<TestResponse>,
}

impl fmt::Debug for TestWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestWorld")
            .field("app_started", &self.app.is_some())
            .field("last_response", &self.last_response)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct TestResponse {
    pub status: u16,
    pub body: Value,
}

impl TestWorld {
    pub fn use_reference_tenant(&mut self) {
        self.tenant = reference_tenant();
        self.app = None;
    }

    /// Source collection by its display label
    pub fn source_by_label(label: &str) -> SourceCollection {
        SourceCollection::ALL
            .into_iter()
            .find(|s| s.label() == label)
            .unwrap_or_else(|| panic!("unknown source collection {}", label))
    }

    fn app(&mut self) -> &TestApp {
        if self.app.is_none() {
            self.app = Some(TestApp::new(self.tenant.clone()));
        }
        self.app.as_ref().unwrap()
    }

    pub async fn get(&mut self, uri: &str) {
        let response = self.app().get(uri).await;
        self.last_response = Some(TestResponse {
            status: response.status.as_u16(),
            body: serde_json::from_slice(&response.body).unwrap_or(Value::Null),
        });
    }

    pub async fn post(&mut self, uri: &str, body: Value) {
        let response = self.app().post_json(uri, body).await;
        self.last_response = Some(TestResponse {
            status: response.status.as_u16(),
            body: serde_json::from_slice(&response.body).unwrap_or(Value::Null),
        });
    }

    /// Body of the last response
    pub fn body(&self) -> &Value {
        &self
            .last_response
            .as_ref()
            .expect("No response available")
            .body
    }
}
