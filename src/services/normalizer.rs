//! Policy normalizer
//!
//! Turns raw JSON batches from the source collections into [`PolicyRecord`]s.
//! Records that fail schema validation are skipped with a warning; nothing in
//! here returns an error.

use serde_json::Value;
use tracing::{debug, warn};

use crate::models::{
    AssignmentFilter, AssignmentIntent, AssignmentTarget, PolicyCategory, PolicyRecord,
    RawAssignment, RawBatch, RawPolicy, SourceCollection, TargetKind, TargetScope,
    TemplateFamily, INTENT_ODATA_TYPE,
};

/// Normalize every batch, preserving batch and record order
pub fn normalize(batches: &[RawBatch]) -> Vec<PolicyRecord> {
    let policies: Vec<PolicyRecord> = batches.iter().flat_map(normalize_batch).collect();
    debug!(count = policies.len(), "Normalized policies");
    policies
}

/// Normalize a single source collection
pub fn normalize_batch(batch: &RawBatch) -> Vec<PolicyRecord> {
    batch
        .records
        .iter()
        .filter_map(|record| normalize_record(batch.source, record))
        .collect()
}

/// Normalize one raw record, or `None` when it is invalid or filtered out
pub fn normalize_record(source: SourceCollection, record: &Value) -> Option<PolicyRecord> {
    let raw: RawPolicy = match serde_json::from_value(record.clone()) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(source = source.label(), error = %e, "Skipping malformed record");
            return None;
        }
    };

    let category = categorize(source, &raw)?;
    let name = raw.display_name();
    let platform = detect_platform(&raw, &name);

    Some(PolicyRecord {
        assignment_targets: raw.assignments.iter().map(to_target).collect(),
        platform,
        created_at: raw.created_at(),
        modified_at: raw.modified_at(),
        template_id: raw
            .template_reference
            .as_ref()
            .and_then(|r| r.template_id.clone())
            .or_else(|| raw.template_id.clone()),
        template_display_name: raw
            .template_reference
            .as_ref()
            .and_then(|r| r.template_display_name.clone()),
        technologies: raw.technologies.clone(),
        description: raw.description.clone(),
        odata_type: match source {
            // Intent listings omit the entity type; the settings endpoint depends on it
            SourceCollection::Intents => raw
                .odata_type
                .clone()
                .or_else(|| Some(INTENT_ODATA_TYPE.to_string())),
            _ => raw.odata_type.clone(),
        },
        id: raw.id,
        name,
        category,
    })
}

/// Category for a record from the given source; `None` drops the record
fn categorize(source: SourceCollection, raw: &RawPolicy) -> Option<PolicyCategory> {
    let category = match source {
        SourceCollection::ConfigurationPolicies => raw
            .template_family()
            .map(TemplateFamily::parse)
            .unwrap_or(TemplateFamily::Unrecognized)
            .category(),
        SourceCollection::Intents => {
            let category = raw
                .template_family()
                .map(TemplateFamily::parse)
                .unwrap_or(TemplateFamily::Unrecognized)
                .category();
            // Baselines and legacy intents have no settings catalog counterpart
            if !category.is_endpoint_security() {
                debug!(id = %raw.id, "Skipping intent outside endpoint security");
                return None;
            }
            category
        }
        SourceCollection::DeviceConfigurations => PolicyCategory::DeviceConfiguration,
        SourceCollection::CompliancePolicies => PolicyCategory::CompliancePolicy,
        SourceCollection::MobileApps => PolicyCategory::Application,
        SourceCollection::DeviceManagementScripts => PolicyCategory::Script,
        SourceCollection::GroupPolicyConfigurations => PolicyCategory::AdministrativeTemplate,
        SourceCollection::AppProtectionPolicies => PolicyCategory::AppProtectionPolicy,
        SourceCollection::AppConfigurations => PolicyCategory::AppConfigurationPolicy,
        SourceCollection::DeviceHealthScripts => PolicyCategory::ProactiveRemediationScript,
        SourceCollection::AutopilotProfiles => PolicyCategory::AutopilotProfile,
        SourceCollection::EnrollmentConfigurations => {
            // Only the enrollment status page variant of this collection is a policy of interest
            let is_esp = raw
                .odata_type
                .as_deref()
                .is_some_and(|t| t.contains("EnrollmentCompletionPageConfiguration"));
            if !is_esp {
                return None;
            }
            PolicyCategory::EnrollmentStatusPage
        }
        SourceCollection::CloudPcProvisioningPolicies => PolicyCategory::CloudPcProvisioningPolicy,
        SourceCollection::CloudPcUserSettings => PolicyCategory::CloudPcUserSetting,
    };
    Some(category)
}

fn to_target(assignment: &RawAssignment) -> AssignmentTarget {
    let Some(target) = assignment.target.as_ref() else {
        return AssignmentTarget::new(TargetScope::Other);
    };

    let kind = TargetKind::from_odata_type(target.odata_type.as_deref().unwrap_or_default());
    AssignmentTarget {
        target: TargetScope::new(kind, target.group_id.as_deref()),
        filter: AssignmentFilter::from_parts(
            target.device_and_app_management_assignment_filter_id.as_deref(),
            target.device_and_app_management_assignment_filter_type.as_deref(),
        ),
        intent: assignment.intent.as_deref().and_then(parse_intent),
    }
}

fn parse_intent(raw: &str) -> Option<AssignmentIntent> {
    match raw {
        "required" => Some(AssignmentIntent::Required),
        "available" => Some(AssignmentIntent::Available),
        "uninstall" => Some(AssignmentIntent::Uninstall),
        "availableWithoutEnrollment" => Some(AssignmentIntent::AvailableWithoutEnrollment),
        _ => None,
    }
}

/// Platform from the explicit field, then the odata type, then the name and description
fn detect_platform(raw: &RawPolicy, name: &str) -> Option<String> {
    if let Some(platforms) = raw.platforms.as_deref().filter(|p| !p.is_empty()) {
        return Some(platforms.to_string());
    }

    if let Some(odata) = raw.odata_type.as_deref() {
        let odata = odata.to_lowercase();
        let platform = if odata.contains("windows") {
            Some("Windows")
        } else if odata.contains("ios") {
            Some("iOS")
        } else if odata.contains("android") {
            Some("Android")
        } else if odata.contains("macos") {
            Some("macOS")
        } else {
            None
        };
        if let Some(p) = platform {
            return Some(p.to_string());
        }
    }

    let text = format!("{} {}", name, raw.description.as_deref().unwrap_or_default()).to_lowercase();
    let platform = if text.contains("windows") {
        "Windows"
    } else if text.contains("ios") || text.contains("ipad") {
        "iOS"
    } else if text.contains("android") {
        "Android"
    } else if text.contains("macos") || text.contains("mac os") {
        "macOS"
    } else {
        return None;
    };
    Some(platform.to_string())
}
