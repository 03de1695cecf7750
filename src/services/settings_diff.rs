//! Settings-value diff across subjects
//!
//! Fetches the flattened configuration of every effectively-applied,
//! settings-catalog style policy (each policy once, with bounded concurrency),
//! then reports the settings whose values differ between subjects.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, instrument, warn};

use crate::models::{
    ConfigItem, PolicyRecord, SettingValue, SettingsDiffRow, Subject, SubjectKey,
};
use crate::services::cache::{PolicyConfigCache, PolicyConfigKey};
use crate::services::sources::PolicyConfigSource;
use crate::utils::{AppError, AppResult};

/// Per-setting aggregation for one subject: values and contributing policy names
#[derive(Debug, Default)]
struct SettingAccumulator {
    values: BTreeSet<String>,
    sources: BTreeSet<String>,
}

/// Computes settings diffs, memoizing configuration fetches
#[derive(Clone)]
pub struct SettingsDiffService {
    source: Arc<dyn PolicyConfigSource>,
    cache: Option<Arc<PolicyConfigCache>>,
    concurrency: usize,
}

impl SettingsDiffService {
    pub fn new(
        source: Arc<dyn PolicyConfigSource>,
        cache: Option<Arc<PolicyConfigCache>>,
        concurrency: usize,
    ) -> Self {
        Self {
            source,
            cache,
            concurrency: concurrency.max(1),
        }
    }

    /// Rows for settings with at least two distinct values across `subjects`.
    ///
    /// Any failed configuration fetch fails the whole diff with
    /// [`AppError::PartialData`], so an incomplete diff is never reported as
    /// complete.
    #[instrument(skip_all, fields(subjects = subjects.len()))]
    pub async fn diff(
        &self,
        subjects: &[Subject],
        effective_ids_by_subject: &BTreeMap<SubjectKey, BTreeSet<String>>,
        policies: &[PolicyRecord],
    ) -> AppResult<Vec<SettingsDiffRow>> {
        let by_id: HashMap<&str, &PolicyRecord> =
            policies.iter().map(|p| (p.id.as_str(), p)).rev().collect();

        // Eligible policies per subject, and the set of distinct fetches
        let mut per_subject: Vec<(SubjectKey, Vec<&PolicyRecord>)> = Vec::new();
        let mut to_fetch: BTreeMap<PolicyConfigKey, &PolicyRecord> = BTreeMap::new();
        for subject in subjects {
            let key = subject.key();
            let eligible: Vec<&PolicyRecord> = effective_ids_by_subject
                .get(&key)
                .into_iter()
                .flatten()
                .filter_map(|id| by_id.get(id.as_str()).copied())
                .filter(|p| p.category.is_settings_diff_eligible())
                .collect();
            for policy in &eligible {
                to_fetch.insert((policy.id.clone(), policy.category), policy);
            }
            per_subject.push((key, eligible));
        }

        debug!(fetches = to_fetch.len(), "Fetching policy configurations");
        let jobs: Vec<(PolicyConfigKey, PolicyRecord)> = to_fetch
            .into_iter()
            .map(|(key, policy)| (key, policy.clone()))
            .collect();
        let fetched: Vec<(PolicyConfigKey, AppResult<Arc<Vec<ConfigItem>>>)> =
            stream::iter(jobs)
                .map(|(key, policy)| async move {
                    let items = self.configuration(&policy).await;
                    (key, items)
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

        let mut configs: HashMap<PolicyConfigKey, Arc<Vec<ConfigItem>>> = HashMap::new();
        let mut failed = Vec::new();
        for (key, result) in fetched {
            match result {
                Ok(items) => {
                    configs.insert(key, items);
                }
                Err(e) => {
                    warn!(policy_id = %key.0, error = %e, "Policy configuration fetch failed");
                    failed.push(key.0);
                }
            }
        }
        if !failed.is_empty() {
            failed.sort();
            return Err(AppError::partial(
                format!(
                    "configuration could not be fetched for {} of {} policies",
                    failed.len(),
                    failed.len() + configs.len()
                ),
                failed,
            ));
        }

        // subject -> setting name -> accumulator
        let mut settings: Vec<(SubjectKey, HashMap<String, SettingAccumulator>)> = Vec::new();
        for (key, eligible) in per_subject {
            let mut map: HashMap<String, SettingAccumulator> = HashMap::new();
            for policy in eligible {
                let Some(items) = configs.get(&(policy.id.clone(), policy.category)) else {
                    continue;
                };
                for item in items.iter() {
                    let entry = map.entry(item.name.clone()).or_default();
                    entry.values.insert(item.value.clone());
                    entry.sources.insert(policy.name.clone());
                }
            }
            settings.push((key, map));
        }

        let rows = diff_rows(&settings);
        info!(rows = rows.len(), "Settings diff complete");
        Ok(rows)
    }

    /// Flattened configuration of one policy, memoized per `(id, category)`
    pub async fn configuration(&self, policy: &PolicyRecord) -> AppResult<Arc<Vec<ConfigItem>>> {
        let load = || async {
            self.source
                .fetch_policy_configuration(&policy.id, policy.category, policy.odata_type.as_deref())
                .await
                .map(Arc::new)
        };
        match &self.cache {
            Some(cache) => {
                cache
                    .get_or_try_insert_with((policy.id.clone(), policy.category), load)
                    .await
            }
            None => load().await,
        }
    }
}

fn diff_rows(settings: &[(SubjectKey, HashMap<String, SettingAccumulator>)]) -> Vec<SettingsDiffRow> {
    let names: BTreeSet<&str> = settings
        .iter()
        .flat_map(|(_, map)| map.keys().map(String::as_str))
        .collect();

    let mut rows: Vec<SettingsDiffRow> = names
        .into_iter()
        .filter_map(|name| {
            let per_subject: BTreeMap<SubjectKey, SettingValue> = settings
                .iter()
                .map(|(key, map)| {
                    let value = match map.get(name) {
                        Some(acc) => SettingValue {
                            value: acc.values.iter().cloned().collect::<Vec<_>>().join(" | "),
                            sources: acc.sources.iter().cloned().collect(),
                        },
                        None => SettingValue::missing(),
                    };
                    (key.clone(), value)
                })
                .collect();

            let distinct: BTreeSet<&str> = per_subject.values().map(|v| v.value.as_str()).collect();
            (distinct.len() > 1).then(|| SettingsDiffRow {
                name: name.to_string(),
                per_subject,
            })
        })
        .collect();

    rows.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name))
    });
    rows
}
