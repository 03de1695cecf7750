//! Resolution results for one subject

use serde::{Deserialize, Serialize};

use super::policy::PolicyCategory;
use super::subject::Subject;

/// Outcome of resolving one policy against one subject.
///
/// Only produced when the subject matched at least one include or exclude
/// target, so `present` is always true on a constructed value. It is kept as
/// a field so the JSON shape stays self-describing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceResult {
    pub present: bool,
    pub excluded: bool,
    pub reasons: Vec<String>,
    pub filters: Vec<String>,
}

impl PresenceResult {
    /// Exclusion always overrides inclusion
    pub fn effectively_applied(&self) -> bool {
        self.present && !self.excluded
    }

    pub fn status_label(&self) -> &'static str {
        if self.excluded {
            "Excluded"
        } else {
            "Included"
        }
    }
}

/// Intent shown in the single-subject detail view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailIntent {
    Required,
    Available,
    Excluded,
}

/// A policy reached through one particular route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InheritedPolicy {
    pub id: String,
    pub name: String,
    pub category: PolicyCategory,
    pub intent: DetailIntent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub filters: Vec<String>,
}

/// Policies reaching a subject through one route: All Users, All Devices or a group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentRoute {
    /// "All Users", "All Devices" or the group display name
    pub via: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub policies: Vec<InheritedPolicy>,
}

/// Full, uncapped assignment picture for a single subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAssignments {
    pub subject: Subject,
    pub routes: Vec<AssignmentRoute>,
    /// Presence keyed by policy id, for present policies only
    pub presence: std::collections::BTreeMap<String, PresenceResult>,
    /// Number of distinct policies across all routes
    pub total_policies: usize,
}

impl SubjectAssignments {
    /// Ids of policies that are present and not excluded
    pub fn effective_policy_ids(&self) -> impl Iterator<Item = &str> {
        self.presence
            .iter()
            .filter(|(_, p)| p.effectively_applied())
            .map(|(id, _)| id.as_str())
    }

    pub fn excluded_policy_ids(&self) -> impl Iterator<Item = &str> {
        self.presence
            .iter()
            .filter(|(_, p)| p.excluded)
            .map(|(id, _)| id.as_str())
    }
}
