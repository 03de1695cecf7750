//! Multi-subject comparison output

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::policy::PolicyCategory;
use super::presence::PresenceResult;
use super::subject::{Subject, SubjectKey};

/// Placeholder shown for a subject that has no value for a setting
pub const MISSING_VALUE: &str = "—";

/// One subject's cell in a comparison row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum CellState {
    /// No target of the policy matched this subject
    NotPresent,
    Present(PresenceResult),
}

impl CellState {
    pub fn is_present(&self) -> bool {
        matches!(self, CellState::Present(_))
    }

    /// "Included", "Excluded" or the not-present marker
    pub fn label(&self) -> &'static str {
        match self {
            CellState::NotPresent => MISSING_VALUE,
            CellState::Present(result) => result.status_label(),
        }
    }

    pub fn presence(&self) -> Option<&PresenceResult> {
        match self {
            CellState::NotPresent => None,
            CellState::Present(result) => Some(result),
        }
    }
}

/// One policy compared across every subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareRow {
    pub policy_id: String,
    pub name: String,
    pub category: PolicyCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    /// Has an entry for every compared subject
    pub per_subject: BTreeMap<SubjectKey, CellState>,
}

impl CompareRow {
    pub fn cell(&self, key: &SubjectKey) -> &CellState {
        self.per_subject.get(key).unwrap_or(&CellState::NotPresent)
    }

    /// Present for every compared subject
    pub fn is_common(&self) -> bool {
        self.per_subject.values().all(CellState::is_present)
    }
}

/// Compare rows split into common and differing, each sorted by name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareTable {
    pub common: Vec<CompareRow>,
    pub different: Vec<CompareRow>,
}

impl CompareTable {
    pub fn len(&self) -> usize {
        self.common.len() + self.different.len()
    }

    pub fn is_empty(&self) -> bool {
        self.common.is_empty() && self.different.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = &CompareRow> {
        self.common.iter().chain(self.different.iter())
    }

    pub fn find(&self, policy_id: &str) -> Option<&CompareRow> {
        self.rows().find(|r| r.policy_id == policy_id)
    }
}

/// One subject's value for a setting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingValue {
    /// Distinct values joined with " | ", or the missing placeholder
    pub value: String,
    /// Names of the policies that contributed the value
    pub sources: Vec<String>,
}

impl SettingValue {
    pub fn missing() -> Self {
        Self {
            value: MISSING_VALUE.to_string(),
            sources: vec![],
        }
    }
}

/// A setting whose value differs between at least two subjects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsDiffRow {
    pub name: String,
    pub per_subject: BTreeMap<SubjectKey, SettingValue>,
}

impl SettingsDiffRow {
    pub fn distinct_values(&self) -> BTreeSet<&str> {
        self.per_subject.values().map(|v| v.value.as_str()).collect()
    }
}

/// Everything a comparison produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    pub subjects: Vec<Subject>,
    /// Presence maps keyed by subject, then by policy id
    pub per_subject_presence: BTreeMap<SubjectKey, BTreeMap<String, PresenceResult>>,
    pub effective_ids_by_subject: BTreeMap<SubjectKey, BTreeSet<String>>,
    pub policies: CompareTable,
    pub apps: CompareTable,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings_diff: Option<Vec<SettingsDiffRow>>,
}

impl ComparisonResult {
    pub fn all_rows(&self) -> impl Iterator<Item = &CompareRow> {
        self.policies.rows().chain(self.apps.rows())
    }

    pub fn row(&self, policy_id: &str) -> Option<&CompareRow> {
        self.policies
            .find(policy_id)
            .or_else(|| self.apps.find(policy_id))
    }
}
