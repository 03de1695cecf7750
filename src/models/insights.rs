//! Tenant-wide inventory insights

use serde::Serialize;

/// How many policies fall into one bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountEntry {
    pub name: String,
    pub count: usize,
}

impl CountEntry {
    pub fn new(name: impl Into<String>, count: usize) -> Self {
        Self {
            name: name.into(),
            count,
        }
    }
}

/// Assignment coverage and distribution of the policy inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryInsights {
    pub total: usize,
    /// Policies with at least one All Users, All Devices or group target
    pub assigned: usize,
    pub unassigned: usize,
    /// `assigned / total` as a rounded percentage; 0 for an empty inventory
    pub coverage_percent: u8,
    /// Largest first
    pub by_category: Vec<CountEntry>,
    /// Windows, iOS, Android, macOS and Other, empty buckets omitted
    pub by_platform: Vec<CountEntry>,
    /// Groups included by the most policies
    pub top_groups: Vec<CountEntry>,
    pub failed_sources: Vec<String>,
}
