//! Normalized policy data model

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category of a manageable configuration object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PolicyCategory {
    #[serde(rename = "Device Configuration")]
    DeviceConfiguration,
    #[serde(rename = "Compliance Policy")]
    CompliancePolicy,
    #[serde(rename = "Application")]
    Application,
    #[serde(rename = "Script")]
    Script,
    #[serde(rename = "Settings Catalog")]
    SettingsCatalog,
    #[serde(rename = "Administrative Template")]
    AdministrativeTemplate,
    #[serde(rename = "App Protection Policy")]
    AppProtectionPolicy,
    #[serde(rename = "App Configuration Policy")]
    AppConfigurationPolicy,
    #[serde(rename = "Proactive Remediation Script")]
    ProactiveRemediationScript,
    #[serde(rename = "Autopilot Profile")]
    AutopilotProfile,
    #[serde(rename = "Enrollment Status Page")]
    EnrollmentStatusPage,
    #[serde(rename = "Cloud PC Provisioning Policy")]
    CloudPcProvisioningPolicy,
    #[serde(rename = "Cloud PC User Setting")]
    CloudPcUserSetting,
    #[serde(rename = "Endpoint Security - Antivirus")]
    EndpointSecurityAntivirus,
    #[serde(rename = "Endpoint Security - Disk Encryption")]
    EndpointSecurityDiskEncryption,
    #[serde(rename = "Endpoint Security - Firewall")]
    EndpointSecurityFirewall,
    #[serde(rename = "Endpoint Security - EDR")]
    EndpointSecurityEdr,
    #[serde(rename = "Endpoint Security - ASR")]
    EndpointSecurityAsr,
    #[serde(rename = "Endpoint Security - EPM")]
    EndpointSecurityEpm,
    #[serde(rename = "Other", other)]
    Other,
}

impl PolicyCategory {
    /// Human-readable label, identical to the serialized form
    pub fn label(&self) -> &'static str {
        match self {
            PolicyCategory::DeviceConfiguration => "Device Configuration",
            PolicyCategory::CompliancePolicy => "Compliance Policy",
            PolicyCategory::Application => "Application",
            PolicyCategory::Script => "Script",
            PolicyCategory::SettingsCatalog => "Settings Catalog",
            PolicyCategory::AdministrativeTemplate => "Administrative Template",
            PolicyCategory::AppProtectionPolicy => "App Protection Policy",
            PolicyCategory::AppConfigurationPolicy => "App Configuration Policy",
            PolicyCategory::ProactiveRemediationScript => "Proactive Remediation Script",
            PolicyCategory::AutopilotProfile => "Autopilot Profile",
            PolicyCategory::EnrollmentStatusPage => "Enrollment Status Page",
            PolicyCategory::CloudPcProvisioningPolicy => "Cloud PC Provisioning Policy",
            PolicyCategory::CloudPcUserSetting => "Cloud PC User Setting",
            PolicyCategory::EndpointSecurityAntivirus => "Endpoint Security - Antivirus",
            PolicyCategory::EndpointSecurityDiskEncryption => "Endpoint Security - Disk Encryption",
            PolicyCategory::EndpointSecurityFirewall => "Endpoint Security - Firewall",
            PolicyCategory::EndpointSecurityEdr => "Endpoint Security - EDR",
            PolicyCategory::EndpointSecurityAsr => "Endpoint Security - ASR",
            PolicyCategory::EndpointSecurityEpm => "Endpoint Security - EPM",
            PolicyCategory::Other => "Other",
        }
    }

    /// Whether this is one of the endpoint-security subcategories
    pub fn is_endpoint_security(&self) -> bool {
        self.label().starts_with("Endpoint Security")
    }

    /// Only settings-catalog style policies take part in the settings diff
    pub fn is_settings_diff_eligible(&self) -> bool {
        *self == PolicyCategory::SettingsCatalog || self.is_endpoint_security()
    }

    /// Whether this category is an application rather than a policy
    pub fn is_application(&self) -> bool {
        *self == PolicyCategory::Application
    }
}

impl fmt::Display for PolicyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Entity type of records from the intents collection
pub const INTENT_ODATA_TYPE: &str = "#microsoft.graph.deviceManagementIntent";

/// Endpoint-security template families reported by configuration policies and intents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateFamily {
    Antivirus,
    DiskEncryption,
    Firewall,
    EndpointDetectionAndResponse,
    AttackSurfaceReductionRules,
    EndpointPrivilegeManagement,
    /// Any family that is not an endpoint-security one
    Unrecognized,
}

impl TemplateFamily {
    /// Parse the raw `templateFamily` tag
    pub fn parse(raw: &str) -> Self {
        match raw {
            "endpointSecurityAntivirus" => TemplateFamily::Antivirus,
            "endpointSecurityDiskEncryption" => TemplateFamily::DiskEncryption,
            "endpointSecurityFirewall" => TemplateFamily::Firewall,
            "endpointSecurityEndpointDetectionAndResponse" => {
                TemplateFamily::EndpointDetectionAndResponse
            }
            "endpointSecurityAttackSurfaceReductionRules" => {
                TemplateFamily::AttackSurfaceReductionRules
            }
            "endpointSecurityEndpointPrivilegeManagement" => {
                TemplateFamily::EndpointPrivilegeManagement
            }
            _ => TemplateFamily::Unrecognized,
        }
    }

    /// Route a family to its category; unrecognized families become settings catalog
    pub fn category(&self) -> PolicyCategory {
        match self {
            TemplateFamily::Antivirus => PolicyCategory::EndpointSecurityAntivirus,
            TemplateFamily::DiskEncryption => PolicyCategory::EndpointSecurityDiskEncryption,
            TemplateFamily::Firewall => PolicyCategory::EndpointSecurityFirewall,
            TemplateFamily::EndpointDetectionAndResponse => PolicyCategory::EndpointSecurityEdr,
            TemplateFamily::AttackSurfaceReductionRules => PolicyCategory::EndpointSecurityAsr,
            TemplateFamily::EndpointPrivilegeManagement => PolicyCategory::EndpointSecurityEpm,
            TemplateFamily::Unrecognized => PolicyCategory::SettingsCatalog,
        }
    }
}

/// Discriminant of an assignment target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetKind {
    AllUsers,
    AllDevices,
    IncludeGroup,
    ExcludeGroup,
    Other,
}

impl TargetKind {
    /// Map a raw `@odata.type` discriminator by substring match
    pub fn from_odata_type(odata_type: &str) -> Self {
        // Exclusion is checked first so the include pattern can never shadow it
        if odata_type.contains("exclusionGroupAssignmentTarget") {
            TargetKind::ExcludeGroup
        } else if odata_type.contains("groupAssignmentTarget") {
            TargetKind::IncludeGroup
        } else if odata_type.contains("allLicensedUsersAssignmentTarget") {
            TargetKind::AllUsers
        } else if odata_type.contains("allDevicesAssignmentTarget") {
            TargetKind::AllDevices
        } else {
            TargetKind::Other
        }
    }
}

/// Who an assignment target points at.
///
/// Group variants always carry their group id, so a group target without an id
/// cannot be represented.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TargetScope {
    AllUsers,
    AllDevices,
    IncludeGroup {
        #[serde(rename = "groupId")]
        group_id: String,
    },
    ExcludeGroup {
        #[serde(rename = "groupId")]
        group_id: String,
    },
    Other,
}

impl TargetScope {
    /// Build a scope from a kind and an optional group id.
    ///
    /// Group kinds without a group id degrade to `Other`.
    pub fn new(kind: TargetKind, group_id: Option<&str>) -> Self {
        let group_id = group_id.map(str::trim).filter(|g| !g.is_empty());
        match (kind, group_id) {
            (TargetKind::AllUsers, _) => TargetScope::AllUsers,
            (TargetKind::AllDevices, _) => TargetScope::AllDevices,
            (TargetKind::IncludeGroup, Some(id)) => TargetScope::IncludeGroup {
                group_id: id.to_string(),
            },
            (TargetKind::ExcludeGroup, Some(id)) => TargetScope::ExcludeGroup {
                group_id: id.to_string(),
            },
            _ => TargetScope::Other,
        }
    }

    pub fn kind(&self) -> TargetKind {
        match self {
            TargetScope::AllUsers => TargetKind::AllUsers,
            TargetScope::AllDevices => TargetKind::AllDevices,
            TargetScope::IncludeGroup { .. } => TargetKind::IncludeGroup,
            TargetScope::ExcludeGroup { .. } => TargetKind::ExcludeGroup,
            TargetScope::Other => TargetKind::Other,
        }
    }

    pub fn group_id(&self) -> Option<&str> {
        match self {
            TargetScope::IncludeGroup { group_id } | TargetScope::ExcludeGroup { group_id } => {
                Some(group_id)
            }
            _ => None,
        }
    }
}

/// Device/app filter narrowing an assignment target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssignmentFilter {
    pub id: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub filter_type: Option<String>,
}

impl AssignmentFilter {
    /// Build a filter, returning `None` for the "no filter" encodings
    /// (missing id, the nil GUID, or type `none`).
    pub fn from_parts(id: Option<&str>, filter_type: Option<&str>) -> Option<Self> {
        let filter = Self {
            id: id?.trim().to_string(),
            filter_type: filter_type
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
        };
        filter.is_active().then_some(filter)
    }

    /// Whether this filter actually narrows the target
    pub fn is_active(&self) -> bool {
        let id = self.id.trim();
        if id.is_empty() {
            return false;
        }
        if let Some(ref t) = self.filter_type {
            if t.trim().eq_ignore_ascii_case("none") {
                return false;
            }
        }
        !matches!(Uuid::parse_str(id), Ok(uuid) if uuid.is_nil())
    }

    /// Display form: `Filter {type}: {first 8 chars of id}…`
    pub fn describe(&self) -> Option<String> {
        if !self.is_active() {
            return None;
        }
        let id = self.id.trim();
        let short_id = if id.chars().count() >= 8 {
            format!("{}…", id.chars().take(8).collect::<String>())
        } else {
            id.to_string()
        };
        Some(match &self.filter_type {
            Some(t) => format!("Filter {}: {}", t, short_id),
            None => format!("Filter: {}", short_id),
        })
    }
}

/// Deployment intent of an assignment (apps carry one; most policies do not)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssignmentIntent {
    Required,
    Available,
    Uninstall,
    AvailableWithoutEnrollment,
}

/// One inclusion or exclusion rule attached to a policy
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentTarget {
    pub target: TargetScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<AssignmentFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<AssignmentIntent>,
}

impl AssignmentTarget {
    pub fn new(target: TargetScope) -> Self {
        Self {
            target,
            filter: None,
            intent: None,
        }
    }

    pub fn all_users() -> Self {
        Self::new(TargetScope::AllUsers)
    }

    pub fn all_devices() -> Self {
        Self::new(TargetScope::AllDevices)
    }

    pub fn include(group_id: impl Into<String>) -> Self {
        Self::new(TargetScope::IncludeGroup {
            group_id: group_id.into(),
        })
    }

    pub fn exclude(group_id: impl Into<String>) -> Self {
        Self::new(TargetScope::ExcludeGroup {
            group_id: group_id.into(),
        })
    }

    /// Attach a filter; inactive filters are dropped
    pub fn with_filter(mut self, filter: AssignmentFilter) -> Self {
        self.filter = filter.is_active().then_some(filter);
        self
    }

    pub fn with_intent(mut self, intent: AssignmentIntent) -> Self {
        self.intent = Some(intent);
        self
    }

    pub fn kind(&self) -> TargetKind {
        self.target.kind()
    }

    pub fn group_id(&self) -> Option<&str> {
        self.target.group_id()
    }
}

/// Coarse assignment summary shown in the policy table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentStatus {
    #[serde(rename = "All Users")]
    AllUsers,
    #[serde(rename = "All Devices")]
    AllDevices,
    #[serde(rename = "Group")]
    Group,
    #[serde(rename = "None")]
    None,
}

/// One manageable configuration object in its uniform shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRecord {
    pub id: String,
    pub name: String,
    pub category: PolicyCategory,
    #[serde(default)]
    pub assignment_targets: Vec<AssignmentTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Raw `@odata.type`, used to pick configuration endpoints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub odata_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technologies: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

impl PolicyRecord {
    /// Minimal record, mostly useful for tests and fixtures
    pub fn new(id: impl Into<String>, name: impl Into<String>, category: PolicyCategory) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category,
            assignment_targets: vec![],
            platform: None,
            description: None,
            odata_type: None,
            template_id: None,
            template_display_name: None,
            technologies: None,
            created_at: None,
            modified_at: None,
        }
    }

    pub fn with_targets(mut self, targets: Vec<AssignmentTarget>) -> Self {
        self.assignment_targets = targets;
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    pub fn assignment_status(&self) -> AssignmentStatus {
        let has = |kind: TargetKind| self.assignment_targets.iter().any(|t| t.kind() == kind);
        if has(TargetKind::AllUsers) {
            AssignmentStatus::AllUsers
        } else if has(TargetKind::AllDevices) {
            AssignmentStatus::AllDevices
        } else if has(TargetKind::IncludeGroup) {
            AssignmentStatus::Group
        } else {
            AssignmentStatus::None
        }
    }

    /// Group display names this policy targets, excluded groups prefixed
    pub fn assigned_to(&self, group_names: &HashMap<String, String>) -> Vec<String> {
        let name_of = |id: &str| {
            group_names
                .get(id)
                .cloned()
                .unwrap_or_else(|| format!("Group {}", id))
        };

        let included = self
            .assignment_targets
            .iter()
            .filter(|t| t.kind() == TargetKind::IncludeGroup)
            .filter_map(|t| t.group_id())
            .map(name_of);
        let excluded = self
            .assignment_targets
            .iter()
            .filter(|t| t.kind() == TargetKind::ExcludeGroup)
            .filter_map(|t| t.group_id())
            .map(|id| format!("[Excluded] {}", name_of(id)));

        included.chain(excluded).collect()
    }

    /// Every group id referenced by an include or exclude target
    pub fn referenced_group_ids(&self) -> impl Iterator<Item = &str> {
        self.assignment_targets.iter().filter_map(|t| t.group_id())
    }
}
