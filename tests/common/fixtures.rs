//! Test fixtures
//!
//! Raw Graph-shaped records and a small reference tenant.

use serde_json::{json, Value};

use intune_assignment_checker::models::SourceCollection;

use super::mocks::MockTenant;

pub const ALICE: &str = "u-alice";
pub const BOB: &str = "u-bob";
pub const LAPTOP: &str = "md-laptop";
pub const LAPTOP_DIRECTORY_ID: &str = "aad-laptop";
pub const KIOSK: &str = "md-kiosk";
pub const FINANCE: &str = "g-finance";
pub const PILOT: &str = "g-pilot";
pub const CONTRACTORS: &str = "g-contractors";

/// One raw assignment entry
pub fn assignment(odata_type: &str, group_id: Option<&str>) -> Value {
    json!({
        "id": format!("a-{}", group_id.unwrap_or("all")),
        "target": {
            "@odata.type": format!("#microsoft.graph.{}", odata_type),
            "groupId": group_id,
            "deviceAndAppManagementAssignmentFilterId": null,
            "deviceAndAppManagementAssignmentFilterType": "none"
        }
    })
}

pub fn all_users() -> Value {
    assignment("allLicensedUsersAssignmentTarget", None)
}

pub fn all_devices() -> Value {
    assignment("allDevicesAssignmentTarget", None)
}

pub fn include_group(group_id: &str) -> Value {
    assignment("groupAssignmentTarget", Some(group_id))
}

pub fn exclude_group(group_id: &str) -> Value {
    assignment("exclusionGroupAssignmentTarget", Some(group_id))
}

/// Settings catalog policy record as returned by `configurationPolicies`
pub fn settings_catalog_policy(id: &str, name: &str, assignments: Vec<Value>) -> Value {
    json!({
        "id": id,
        "name": name,
        "platforms": "windows10",
        "technologies": "mdm",
        "templateReference": {"templateFamily": "none"},
        "assignments": assignments
    })
}

/// Compliance policy record as returned by `deviceCompliancePolicies`
pub fn compliance_policy(id: &str, name: &str, assignments: Vec<Value>) -> Value {
    json!({
        "id": id,
        "displayName": name,
        "@odata.type": "#microsoft.graph.windows10CompliancePolicy",
        "assignments": assignments
    })
}

/// Mobile app record with assignments already attached
pub fn mobile_app(id: &str, name: &str, assignments: Vec<Value>) -> Value {
    json!({
        "id": id,
        "displayName": name,
        "@odata.type": "#microsoft.graph.win32LobApp",
        "assignments": assignments
    })
}

/// Reference tenant:
///
/// - alice is in Finance and Pilot, bob only in Contractors
/// - the laptop is in Pilot, the kiosk has no directory identity
/// - "Security Baseline" targets All Users but excludes Contractors
/// - "Finance Hardening" targets Finance
/// - "BitLocker Compliance" targets All Devices
/// - "Company Portal" is an app required for Pilot
pub fn reference_tenant() -> MockTenant {
    let tenant = MockTenant::new();
    tenant
        .add_group(FINANCE, "Finance")
        .add_group(PILOT, "Pilot Ring")
        .add_group(CONTRACTORS, "Contractors")
        .add_user(ALICE, "alice@contoso.com", &[FINANCE, PILOT])
        .add_user(BOB, "bob@contoso.com", &[CONTRACTORS])
        .add_device(LAPTOP, "LAPTOP-001", Some(LAPTOP_DIRECTORY_ID), &[PILOT])
        .add_device(KIOSK, "KIOSK-01", None, &[]);

    tenant
        .add_records(
            SourceCollection::ConfigurationPolicies,
            vec![
                settings_catalog_policy(
                    "p-baseline",
                    "Security Baseline",
                    vec![all_users(), exclude_group(CONTRACTORS)],
                ),
                settings_catalog_policy("p-finance", "Finance Hardening", vec![include_group(FINANCE)]),
                settings_catalog_policy("p-unassigned", "Draft Policy", vec![]),
            ],
        )
        .add_records(
            SourceCollection::CompliancePolicies,
            vec![compliance_policy("c-bitlocker", "BitLocker Compliance", vec![all_devices()])],
        )
        .add_records(
            SourceCollection::MobileApps,
            vec![mobile_app("app-portal", "Company Portal", vec![{
                let mut a = include_group(PILOT);
                a["intent"] = json!("required");
                a
            }])],
        );

    tenant
        .set_config(
            "p-baseline",
            &[("Firewall Enabled", "true"), ("Screen Lock Timeout", "300")],
        )
        .set_config(
            "p-finance",
            &[("Screen Lock Timeout", "60"), ("USB Storage", "Blocked")],
        );

    tenant
}
