//! Multi-subject comparator

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{info, instrument};

use crate::models::{
    CellState, CompareRow, CompareTable, ComparisonResult, MembershipSet, PolicyRecord, Subject,
};
use crate::services::membership::MembershipResolver;
use crate::services::progress::{LoadingStage, ProgressSink, ProgressUpdate};
use crate::services::resolution::{AssignmentResolver, ResolveOptions};
use crate::services::session::{run_cancellable, CompareSession};
use crate::services::settings_diff::SettingsDiffService;
use crate::utils::{AppError, AppResult};

/// Compares how policies land on two or more subjects
#[derive(Clone)]
pub struct Comparator {
    memberships: MembershipResolver,
    resolver: AssignmentResolver,
}

impl Comparator {
    pub fn new(memberships: MembershipResolver, display_limit: usize) -> Self {
        Self {
            memberships,
            resolver: AssignmentResolver::new(ResolveOptions::comparison(display_limit)),
        }
    }

    /// Resolve every subject's memberships concurrently, then build the comparison.
    ///
    /// Fails if any subject's memberships cannot be resolved.
    #[instrument(skip_all, fields(subjects = subjects.len(), policies = policies.len()))]
    pub async fn compare(
        &self,
        subjects: &[Subject],
        policies: &[PolicyRecord],
        progress: &dyn ProgressSink,
    ) -> AppResult<ComparisonResult> {
        let subjects = unique_subjects(subjects);
        if subjects.len() < 2 {
            return Err(AppError::ValidationError(
                "at least two distinct subjects are required for a comparison".to_string(),
            ));
        }

        progress.report(ProgressUpdate::new(
            LoadingStage::FetchingGroups,
            20,
            format!("Resolving group memberships for {} subjects...", subjects.len()),
        ));

        let memberships = try_join_all(subjects.iter().map(|subject| async move {
            self.memberships
                .resolve(subject)
                .await
                .map_err(|e| for_subject(e, subject))
        }))
        .await?;

        progress.report(ProgressUpdate::new(
            LoadingStage::Matching,
            70,
            format!("Matching {} policies...", policies.len()),
        ));

        let result = build_comparison(&self.resolver, &subjects, &memberships, policies);

        info!(
            rows = result.policies.len() + result.apps.len(),
            "Comparison complete"
        );
        Ok(result)
    }

    /// Run a comparison inside a session, optionally with a settings diff.
    ///
    /// The run is abandoned when a newer run begins, and only the newest
    /// run's outcome is committed. Dropping the returned future records the
    /// run as cancelled.
    pub async fn run(
        &self,
        session: &Arc<CompareSession<ComparisonResult>>,
        subjects: &[Subject],
        policies: &[PolicyRecord],
        settings: Option<&SettingsDiffService>,
        progress: &dyn ProgressSink,
    ) -> AppResult<ComparisonResult> {
        let guard = session.start().await;

        let outcome = run_cancellable(guard.handle(), async {
            let mut result = self.compare(subjects, policies, progress).await?;
            if let Some(settings) = settings {
                progress.report(ProgressUpdate::new(
                    LoadingStage::Finalizing,
                    85,
                    "Comparing settings values...",
                ));
                let diff = settings
                    .diff(&result.subjects, &result.effective_ids_by_subject, policies)
                    .await?;
                result.settings_diff = Some(diff);
            }
            Ok(result)
        })
        .await;

        guard.finish(&outcome).await;
        if outcome.is_ok() {
            progress.report(ProgressUpdate::new(LoadingStage::Complete, 100, "Comparison ready"));
        }
        outcome
    }
}

/// Pure comparison over already-resolved memberships.
///
/// `memberships[i]` belongs to `subjects[i]`.
pub fn build_comparison(
    resolver: &AssignmentResolver,
    subjects: &[Subject],
    memberships: &[MembershipSet],
    policies: &[PolicyRecord],
) -> ComparisonResult {
    let mut per_subject_presence = BTreeMap::new();
    let mut effective_ids_by_subject = BTreeMap::new();

    for (subject, set) in subjects.iter().zip(memberships) {
        let presence = resolver.resolve_all(subject, set, policies);
        let effective: BTreeSet<String> = presence
            .iter()
            .filter(|(_, p)| p.effectively_applied())
            .map(|(id, _)| id.clone())
            .collect();
        effective_ids_by_subject.insert(subject.key(), effective);
        per_subject_presence.insert(subject.key(), presence);
    }

    // Union of every policy present for at least one subject
    let mut seen = HashSet::new();
    let mut policy_rows = Vec::new();
    let mut app_rows = Vec::new();
    for policy in policies {
        let present_anywhere = per_subject_presence
            .values()
            .any(|presence| presence.contains_key(&policy.id));
        if !present_anywhere || !seen.insert(policy.id.as_str()) {
            continue;
        }

        let per_subject = subjects
            .iter()
            .map(|subject| {
                let cell = per_subject_presence
                    .get(&subject.key())
                    .and_then(|presence| presence.get(&policy.id))
                    .cloned()
                    .map(CellState::Present)
                    .unwrap_or(CellState::NotPresent);
                (subject.key(), cell)
            })
            .collect();

        let row = CompareRow {
            policy_id: policy.id.clone(),
            name: policy.name.clone(),
            category: policy.category,
            platform: policy.platform.clone(),
            per_subject,
        };
        if policy.category.is_application() {
            app_rows.push(row);
        } else {
            policy_rows.push(row);
        }
    }

    ComparisonResult {
        subjects: subjects.to_vec(),
        per_subject_presence,
        effective_ids_by_subject,
        policies: shape_table(policy_rows),
        apps: shape_table(app_rows),
        settings_diff: None,
    }
}

/// Split rows into common and differing, each sorted by name case-insensitively
pub fn shape_table(rows: Vec<CompareRow>) -> CompareTable {
    let (mut common, mut different): (Vec<_>, Vec<_>) =
        rows.into_iter().partition(CompareRow::is_common);
    let by_name = |a: &CompareRow, b: &CompareRow| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.policy_id.cmp(&b.policy_id))
    };
    common.sort_by(by_name);
    different.sort_by(by_name);
    CompareTable { common, different }
}

/// Drop repeated subjects, keeping the first occurrence of each key
fn unique_subjects(subjects: &[Subject]) -> Vec<Subject> {
    let mut seen = HashSet::new();
    subjects
        .iter()
        .filter(|s| seen.insert(s.key()))
        .cloned()
        .collect()
}

/// Prefix an error with the subject it concerns, keeping its kind
fn for_subject(err: AppError, subject: &Subject) -> AppError {
    let prefix = format!("{} ({})", subject.key(), subject.display_label());
    match err {
        AppError::Auth(m) => AppError::Auth(format!("{}: {}", prefix, m)),
        AppError::NotFound(m) => AppError::NotFound(format!("{}: {}", prefix, m)),
        AppError::Network(m) => AppError::Network(format!("{}: {}", prefix, m)),
        other => other,
    }
}
