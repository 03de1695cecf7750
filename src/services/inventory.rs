//! Tenant policy inventory
//!
//! Fetches every source collection, normalizes the records and resolves the
//! display names of all groups referenced by assignment targets.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::models::{
    AssignmentStatus, CountEntry, InventoryInsights, PolicyRecord, RawBatch, SourceCollection,
    TargetKind,
};
use crate::services::cache::InventoryCache;
use crate::services::normalizer::normalize;
use crate::services::progress::{LoadingStage, ProgressSink, ProgressUpdate};
use crate::services::sources::{DirectorySource, PolicySource};
use crate::utils::{AppError, AppResult};

const INVENTORY_KEY: &str = "tenant";

/// Normalized policies of one fetch cycle
#[derive(Debug, Clone, Serialize)]
pub struct Inventory {
    pub policies: Vec<PolicyRecord>,
    /// Display names of groups referenced by any assignment target
    pub group_names: HashMap<String, String>,
    /// Labels of source collections that could not be fetched
    pub failed_sources: Vec<String>,
    pub loaded_at: DateTime<Utc>,
}

impl Inventory {
    pub fn find(&self, policy_id: &str) -> Option<&PolicyRecord> {
        self.policies.iter().find(|p| p.id == policy_id)
    }

    pub fn is_partial(&self) -> bool {
        !self.failed_sources.is_empty()
    }

    /// Coverage and distribution figures, with the `top_groups` most targeted groups
    pub fn insights(&self, top_groups: usize) -> InventoryInsights {
        let total = self.policies.len();
        let assigned = self
            .policies
            .iter()
            .filter(|p| p.assignment_status() != AssignmentStatus::None)
            .count();
        let coverage_percent = if total == 0 {
            0
        } else {
            ((assigned as f64 / total as f64) * 100.0).round() as u8
        };

        let mut categories: HashMap<&str, usize> = HashMap::new();
        let mut platforms: HashMap<&str, usize> = HashMap::new();
        let mut groups: HashMap<String, usize> = HashMap::new();
        for policy in &self.policies {
            *categories.entry(policy.category.label()).or_default() += 1;
            *platforms.entry(platform_bucket(policy.platform.as_deref())).or_default() += 1;

            // A policy counts once per group even if it includes the group twice
            let included: BTreeSet<&str> = policy
                .assignment_targets
                .iter()
                .filter(|t| t.kind() == TargetKind::IncludeGroup)
                .filter_map(|t| t.group_id())
                .collect();
            for id in included {
                let name = self
                    .group_names
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| format!("Group {}", id));
                *groups.entry(name).or_default() += 1;
            }
        }

        let mut top = ranked(groups);
        top.truncate(top_groups);

        InventoryInsights {
            total,
            assigned,
            unassigned: total - assigned,
            coverage_percent,
            by_category: ranked(categories),
            by_platform: ranked(platforms),
            top_groups: top,
            failed_sources: self.failed_sources.clone(),
        }
    }
}

fn platform_bucket(platform: Option<&str>) -> &'static str {
    let Some(platform) = platform.map(str::to_lowercase) else {
        return "Other";
    };
    if platform.contains("windows") {
        "Windows"
    } else if platform.contains("ios") || platform.contains("ipad") {
        "iOS"
    } else if platform.contains("android") {
        "Android"
    } else if platform.contains("mac") {
        "macOS"
    } else {
        "Other"
    }
}

/// Entries by count descending, ties by name
fn ranked<K: Into<String>>(counts: HashMap<K, usize>) -> Vec<CountEntry> {
    let mut entries: Vec<CountEntry> = counts
        .into_iter()
        .map(|(name, count)| CountEntry::new(name, count))
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    entries
}

/// Loads and caches the policy inventory
#[derive(Clone)]
pub struct InventoryService {
    policies: Arc<dyn PolicySource>,
    directory: Arc<dyn DirectorySource>,
    cache: Option<Arc<InventoryCache>>,
    concurrency: usize,
}

impl InventoryService {
    pub fn new(
        policies: Arc<dyn PolicySource>,
        directory: Arc<dyn DirectorySource>,
        cache: Option<Arc<InventoryCache>>,
        concurrency: usize,
    ) -> Self {
        Self {
            policies,
            directory,
            cache,
            concurrency: concurrency.max(1),
        }
    }

    /// Cached inventory, or a fresh load when none is live
    pub async fn load(&self, progress: &dyn ProgressSink) -> AppResult<Arc<Inventory>> {
        match &self.cache {
            Some(cache) => {
                cache
                    .get_or_try_insert_with(INVENTORY_KEY.to_string(), || async {
                        self.load_fresh(progress).await.map(Arc::new)
                    })
                    .await
            }
            None => self.load_fresh(progress).await.map(Arc::new),
        }
    }

    /// Drop the cached inventory and load again
    pub async fn refresh(&self, progress: &dyn ProgressSink) -> AppResult<Arc<Inventory>> {
        if let Some(cache) = &self.cache {
            cache.remove(&INVENTORY_KEY.to_string()).await;
        }
        self.load(progress).await
    }

    /// Fetch every collection with bounded concurrency.
    ///
    /// A failing collection contributes no records and is listed in
    /// `failed_sources`; only a load where every collection fails is an error.
    #[instrument(skip_all)]
    pub async fn load_fresh(&self, progress: &dyn ProgressSink) -> AppResult<Inventory> {
        progress.report(ProgressUpdate::new(
            LoadingStage::FetchingPolicies,
            10,
            "Fetching policies from all sources...",
        ));

        let results: Vec<(SourceCollection, AppResult<Vec<serde_json::Value>>)> =
            stream::iter(SourceCollection::ALL)
                .map(|source| async move { (source, self.policies.fetch_collection(source).await) })
                .buffered(self.concurrency)
                .collect()
                .await;

        let mut batches = Vec::with_capacity(results.len());
        let mut failed_sources = Vec::new();
        for (source, result) in results {
            match result {
                Ok(records) => batches.push(RawBatch::new(source, records)),
                Err(e) => {
                    warn!(source = source.label(), error = %e, "Policy source failed, continuing without it");
                    failed_sources.push(source.label().to_string());
                }
            }
        }

        if batches.is_empty() {
            return Err(AppError::partial(
                "every policy source failed to load",
                failed_sources,
            ));
        }

        progress.report(ProgressUpdate::new(
            LoadingStage::Processing,
            60,
            "Normalizing policy records...",
        ));
        let policies = normalize(&batches);

        let group_ids: Vec<String> = policies
            .iter()
            .flat_map(|p| p.referenced_group_ids())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        progress.report(ProgressUpdate::new(
            LoadingStage::ResolvingGroups,
            80,
            format!("Resolving {} group names...", group_ids.len()),
        ));
        let group_names = if group_ids.is_empty() {
            HashMap::new()
        } else {
            self.directory
                .resolve_group_names(&group_ids)
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "Group name resolution failed, showing raw ids");
                    HashMap::new()
                })
        };

        info!(
            policies = policies.len(),
            groups = group_names.len(),
            failed_sources = failed_sources.len(),
            "Policy inventory loaded"
        );
        progress.report(ProgressUpdate::new(LoadingStage::Complete, 100, "Inventory ready"));

        Ok(Inventory {
            policies,
            group_names,
            failed_sources,
            loaded_at: Utc::now(),
        })
    }
}
