//! In-memory tenant for testing
//!
//! Implements every data source the services consume, so the whole API can
//! run without Microsoft Graph.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use intune_assignment_checker::{
    models::{ConfigItem, GroupRef, PolicyCategory, SourceCollection, Subject, SubjectType},
    services::{DirectorySource, PolicyConfigSource, PolicySource},
    AppError, AppResult,
};

/// Types of errors the mock can simulate
#[derive(Debug, Clone)]
pub enum MockError {
    /// Token rejected
    Unauthorized,
    /// Throttled or unreachable
    Network(String),
}

impl MockError {
    fn to_app_error(&self) -> AppError {
        match self {
            MockError::Unauthorized => AppError::Auth("token rejected".to_string()),
            MockError::Network(m) => AppError::Network(m.clone()),
        }
    }
}

#[derive(Default)]
struct TenantData {
    collections: HashMap<SourceCollection, Vec<Value>>,
    subjects: HashMap<(SubjectType, String), Subject>,
    user_groups: HashMap<String, Vec<GroupRef>>,
    /// Managed device id to directory device id
    device_identities: HashMap<String, String>,
    device_groups: HashMap<String, Vec<GroupRef>>,
    group_names: HashMap<String, String>,
    configs: HashMap<String, Vec<ConfigItem>>,
    failing_sources: HashSet<SourceCollection>,
    failing_configs: HashSet<String>,
    failing_memberships: HashSet<String>,
    membership_delay: Option<Duration>,
}

/// Mock tenant shared between the three source traits
#[derive(Clone, Default)]
pub struct MockTenant {
    data: Arc<RwLock<TenantData>>,
    /// Simulate a tenant-wide failure when set
    pub error_mode: Arc<RwLock<Option<MockError>>>,
    pub collection_calls: Arc<AtomicUsize>,
    pub config_calls: Arc<AtomicUsize>,
}

impl MockTenant {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add raw records to a source collection
    pub fn add_records(&self, source: SourceCollection, records: Vec<Value>) -> &Self {
        self.data
            .write()
            .unwrap()
            .collections
            .entry(source)
            .or_default()
            .extend(records);
        self
    }

    pub fn add_group(&self, id: &str, name: &str) -> &Self {
        let mut data = self.data.write().unwrap();
        data.group_names.insert(id.to_string(), name.to_string());
        data.subjects.insert(
            (SubjectType::Group, id.to_string()),
            Subject::group(id, name),
        );
        drop(data);
        self
    }

    /// Add a user who is a transitive member of the given groups
    pub fn add_user(&self, id: &str, upn: &str, groups: &[&str]) -> &Self {
        let mut data = self.data.write().unwrap();
        let refs = groups.iter().map(|g| group_ref(&data, g)).collect();
        data.user_groups.insert(id.to_string(), refs);
        data.subjects.insert(
            (SubjectType::User, id.to_string()),
            Subject::user(id, upn).with_subtitle(upn),
        );
        drop(data);
        self
    }

    /// Add a managed device; `None` for a device without directory identity
    pub fn add_device(&self, id: &str, name: &str, directory_id: Option<&str>, groups: &[&str]) -> &Self {
        let mut data = self.data.write().unwrap();
        if let Some(directory_id) = directory_id {
            let refs = groups.iter().map(|g| group_ref(&data, g)).collect();
            data.device_identities
                .insert(id.to_string(), directory_id.to_string());
            data.device_groups.insert(directory_id.to_string(), refs);
        }
        data.subjects.insert(
            (SubjectType::Device, id.to_string()),
            Subject::device(id, name),
        );
        drop(data);
        self
    }

    pub fn set_config(&self, policy_id: &str, items: &[(&str, &str)]) -> &Self {
        self.data.write().unwrap().configs.insert(
            policy_id.to_string(),
            items.iter().map(|(n, v)| ConfigItem::new(*n, *v)).collect(),
        );
        self
    }

    pub fn fail_source(&self, source: SourceCollection) -> &Self {
        self.data.write().unwrap().failing_sources.insert(source);
        self
    }

    pub fn fail_config(&self, policy_id: &str) -> &Self {
        self.data
            .write()
            .unwrap()
            .failing_configs
            .insert(policy_id.to_string());
        self
    }

    /// Make membership lookups fail for a user or directory device id
    pub fn fail_memberships(&self, id: &str) -> &Self {
        self.data
            .write()
            .unwrap()
            .failing_memberships
            .insert(id.to_string());
        self
    }

    /// Make every membership lookup take `delay`
    pub fn delay_memberships(&self, delay: Duration) -> &Self {
        self.data.write().unwrap().membership_delay = Some(delay);
        self
    }

    async fn membership_latency(&self) {
        let delay = self.data.read().unwrap().membership_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    pub fn set_error_mode(&self, error: MockError) {
        *self.error_mode.write().unwrap() = Some(error);
    }

    pub fn clear_error_mode(&self) {
        *self.error_mode.write().unwrap() = None;
    }

    fn check_error(&self) -> AppResult<()> {
        match &*self.error_mode.read().unwrap() {
            Some(error) => Err(error.to_app_error()),
            None => Ok(()),
        }
    }
}

fn group_ref(data: &TenantData, id: &str) -> GroupRef {
    GroupRef {
        id: id.to_string(),
        display_name: data.group_names.get(id).cloned(),
    }
}

#[async_trait]
impl PolicySource for MockTenant {
    async fn fetch_collection(&self, source: SourceCollection) -> AppResult<Vec<Value>> {
        self.collection_calls.fetch_add(1, Ordering::SeqCst);
        self.check_error()?;
        let data = self.data.read().unwrap();
        if data.failing_sources.contains(&source) {
            return Err(AppError::Network(format!("{} unavailable", source.label())));
        }
        Ok(data.collections.get(&source).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl DirectorySource for MockTenant {
    async fn user_groups(&self, user_id: &str) -> AppResult<Vec<GroupRef>> {
        self.membership_latency().await;
        self.check_error()?;
        let data = self.data.read().unwrap();
        if data.failing_memberships.contains(user_id) {
            return Err(AppError::Network("transitiveMemberOf failed".to_string()));
        }
        Ok(data.user_groups.get(user_id).cloned().unwrap_or_default())
    }

    async fn device_directory_id(&self, managed_device_id: &str) -> AppResult<Option<String>> {
        self.check_error()?;
        Ok(self
            .data
            .read()
            .unwrap()
            .device_identities
            .get(managed_device_id)
            .cloned())
    }

    async fn device_groups(&self, directory_device_id: &str) -> AppResult<Vec<GroupRef>> {
        self.membership_latency().await;
        self.check_error()?;
        let data = self.data.read().unwrap();
        if data.failing_memberships.contains(directory_device_id) {
            return Err(AppError::Network("transitiveMemberOf failed".to_string()));
        }
        Ok(data
            .device_groups
            .get(directory_device_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn resolve_group_names(&self, group_ids: &[String]) -> AppResult<HashMap<String, String>> {
        self.check_error()?;
        let data = self.data.read().unwrap();
        Ok(group_ids
            .iter()
            .filter_map(|id| data.group_names.get(id).map(|n| (id.clone(), n.clone())))
            .collect())
    }

    async fn describe_subject(&self, subject_type: SubjectType, id: &str) -> AppResult<Subject> {
        self.check_error()?;
        self.data
            .read()
            .unwrap()
            .subjects
            .get(&(subject_type, id.to_string()))
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("{} {}", subject_type, id)))
    }

    async fn search_subjects(&self, subject_type: SubjectType, query: &str) -> AppResult<Vec<Subject>> {
        self.check_error()?;
        if query.chars().count() < 2 {
            return Ok(Vec::new());
        }
        let needle = query.to_lowercase();
        let mut found: Vec<Subject> = self
            .data
            .read()
            .unwrap()
            .subjects
            .values()
            .filter(|s| s.subject_type == subject_type)
            .filter(|s| s.label.to_lowercase().starts_with(&needle))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.label.cmp(&b.label));
        found.truncate(10);
        Ok(found)
    }
}

#[async_trait]
impl PolicyConfigSource for MockTenant {
    async fn fetch_policy_configuration(
        &self,
        policy_id: &str,
        _category: PolicyCategory,
        _odata_type_hint: Option<&str>,
    ) -> AppResult<Vec<ConfigItem>> {
        self.config_calls.fetch_add(1, Ordering::SeqCst);
        self.check_error()?;
        let data = self.data.read().unwrap();
        if data.failing_configs.contains(policy_id) {
            return Err(AppError::Network(format!("settings for {} unavailable", policy_id)));
        }
        Ok(data.configs.get(policy_id).cloned().unwrap_or_default())
    }
}
