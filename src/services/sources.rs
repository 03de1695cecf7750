//! Data sources consumed by the resolution core
//!
//! The Graph client implements all three traits; tests substitute in-memory
//! doubles.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::models::{ConfigItem, GroupRef, PolicyCategory, SourceCollection, Subject, SubjectType};
use crate::utils::AppResult;

/// Raw policy records per source collection, fully paginated
#[async_trait]
pub trait PolicySource: Send + Sync {
    async fn fetch_collection(&self, source: SourceCollection) -> AppResult<Vec<Value>>;
}

/// Users, devices, groups and memberships
#[async_trait]
pub trait DirectorySource: Send + Sync {
    /// Transitive group memberships of a user
    async fn user_groups(&self, user_id: &str) -> AppResult<Vec<GroupRef>>;

    /// Directory identity of a managed device, `None` when the device has none
    async fn device_directory_id(&self, managed_device_id: &str) -> AppResult<Option<String>>;

    /// Transitive group memberships of a directory device object
    async fn device_groups(&self, directory_device_id: &str) -> AppResult<Vec<GroupRef>>;

    /// Display names for the given group ids; unknown ids are left out
    async fn resolve_group_names(&self, group_ids: &[String]) -> AppResult<HashMap<String, String>>;

    /// Look a subject up by type and id
    async fn describe_subject(&self, subject_type: SubjectType, id: &str) -> AppResult<Subject>;

    /// Subjects whose name starts with (or, for devices, contains) the query
    async fn search_subjects(&self, subject_type: SubjectType, query: &str) -> AppResult<Vec<Subject>>;
}

/// Flattened configuration of a single policy
#[async_trait]
pub trait PolicyConfigSource: Send + Sync {
    async fn fetch_policy_configuration(
        &self,
        policy_id: &str,
        category: PolicyCategory,
        odata_type_hint: Option<&str>,
    ) -> AppResult<Vec<ConfigItem>>;
}
