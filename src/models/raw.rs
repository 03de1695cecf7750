//! Raw Microsoft Graph record shapes
//!
//! These types are the schema-validation boundary: loosely-typed JSON from the
//! management API is deserialized into them once, inside the normalizer, and
//! nothing downstream ever sees a `serde_json::Value` policy again.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// The source collection a raw record was fetched from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceCollection {
    DeviceConfigurations,
    CompliancePolicies,
    MobileApps,
    DeviceManagementScripts,
    ConfigurationPolicies,
    GroupPolicyConfigurations,
    AppProtectionPolicies,
    AppConfigurations,
    DeviceHealthScripts,
    AutopilotProfiles,
    EnrollmentConfigurations,
    CloudPcProvisioningPolicies,
    CloudPcUserSettings,
    Intents,
}

impl SourceCollection {
    /// All collections, in fetch order
    pub const ALL: [SourceCollection; 14] = [
        SourceCollection::DeviceConfigurations,
        SourceCollection::CompliancePolicies,
        SourceCollection::MobileApps,
        SourceCollection::DeviceManagementScripts,
        SourceCollection::ConfigurationPolicies,
        SourceCollection::GroupPolicyConfigurations,
        SourceCollection::AppProtectionPolicies,
        SourceCollection::AppConfigurations,
        SourceCollection::DeviceHealthScripts,
        SourceCollection::AutopilotProfiles,
        SourceCollection::EnrollmentConfigurations,
        SourceCollection::CloudPcProvisioningPolicies,
        SourceCollection::CloudPcUserSettings,
        SourceCollection::Intents,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SourceCollection::DeviceConfigurations => "Device Configurations",
            SourceCollection::CompliancePolicies => "Compliance Policies",
            SourceCollection::MobileApps => "Applications",
            SourceCollection::DeviceManagementScripts => "Scripts",
            SourceCollection::ConfigurationPolicies => "Configuration Policies",
            SourceCollection::GroupPolicyConfigurations => "Administrative Templates",
            SourceCollection::AppProtectionPolicies => "App Protection Policies",
            SourceCollection::AppConfigurations => "App Configuration Policies",
            SourceCollection::DeviceHealthScripts => "Proactive Remediation Scripts",
            SourceCollection::AutopilotProfiles => "Autopilot Profiles",
            SourceCollection::EnrollmentConfigurations => "Enrollment Configurations",
            SourceCollection::CloudPcProvisioningPolicies => "Cloud PC Provisioning",
            SourceCollection::CloudPcUserSettings => "Cloud PC User Settings",
            SourceCollection::Intents => "Endpoint Security Intents",
        }
    }
}

/// A batch of raw JSON records from one source collection
#[derive(Debug, Clone)]
pub struct RawBatch {
    pub source: SourceCollection,
    pub records: Vec<serde_json::Value>,
}

impl RawBatch {
    pub fn new(source: SourceCollection, records: Vec<serde_json::Value>) -> Self {
        Self { source, records }
    }
}

/// Template reference carried by configuration policies and intents
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTemplateReference {
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub template_family: Option<String>,
    #[serde(default)]
    pub template_display_name: Option<String>,
}

/// Assignment target sub-object
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTarget {
    #[serde(rename = "@odata.type", default)]
    pub odata_type: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub device_and_app_management_assignment_filter_id: Option<String>,
    #[serde(default)]
    pub device_and_app_management_assignment_filter_type: Option<String>,
}

/// One raw assignment attached to a policy
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAssignment {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub target: Option<RawTarget>,
    #[serde(default)]
    pub intent: Option<String>,
}

/// Fields common to every policy-like Graph entity.
///
/// Only `id` is required; everything else tolerates absence.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPolicy {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "@odata.type", default)]
    pub odata_type: Option<String>,
    #[serde(default)]
    pub platforms: Option<String>,
    #[serde(default)]
    pub technologies: Option<String>,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub template_reference: Option<RawTemplateReference>,
    #[serde(default)]
    pub created_date_time: Option<String>,
    #[serde(default)]
    pub last_modified_date_time: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub assignments: Vec<RawAssignment>,
}

impl RawPolicy {
    /// Display name, falling back to `name` and then to "Unknown"
    pub fn display_name(&self) -> String {
        self.display_name
            .as_deref()
            .or(self.name.as_deref())
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or("Unknown")
            .to_string()
    }

    pub fn template_family(&self) -> Option<&str> {
        self.template_reference
            .as_ref()
            .and_then(|r| r.template_family.as_deref())
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.created_date_time.as_deref())
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.last_modified_date_time.as_deref())
    }
}

fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<RawAssignment>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<RawAssignment>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Group reference returned by `transitiveMemberOf` and `getByIds`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDirectoryObject {
    pub id: String,
    #[serde(rename = "@odata.type", default)]
    pub odata_type: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl RawDirectoryObject {
    pub fn is_group(&self) -> bool {
        self.odata_type.as_deref() == Some("#microsoft.graph.group")
    }
}
