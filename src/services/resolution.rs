//! Assignment resolution engine
//!
//! Given normalized policies and a subject's memberships, decides for every
//! policy whether the subject is targeted at all (`present`), whether an
//! exclusion matched (`excluded`), and why. Everything here is synchronous
//! and pure: identical inputs always give identical results.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use crate::models::{
    AssignmentIntent, AssignmentRoute, AssignmentTarget, DetailIntent, InheritedPolicy,
    MembershipSet, PolicyRecord, PresenceResult, Subject, SubjectAssignments, SubjectType,
    TargetKind,
};

/// Reason shown when a group subject is directly included
pub const DIRECT_GROUP_REASON: &str = "Direct group assignment";
/// Reason shown when a group subject is directly excluded
pub const GROUP_EXCLUDED_REASON: &str = "Excluded by group target";

/// Tuning for a resolution pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Maximum reasons and filters kept per result; `None` keeps all
    pub display_limit: Option<usize>,
}

impl ResolveOptions {
    /// Single-subject detail views show every reason
    pub fn detail() -> Self {
        Self {
            display_limit: None,
        }
    }

    /// Multi-subject comparisons cap reasons and filters
    pub fn comparison(limit: usize) -> Self {
        Self {
            display_limit: Some(limit),
        }
    }
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self::detail()
    }
}

/// Resolves policies against one subject at a time
#[derive(Debug, Clone, Default)]
pub struct AssignmentResolver {
    options: ResolveOptions,
}

/// Include and exclude matches for one (policy, subject) pair
struct Matches<'a> {
    include: Vec<&'a AssignmentTarget>,
    exclude: Vec<&'a AssignmentTarget>,
}

impl AssignmentResolver {
    pub fn new(options: ResolveOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> ResolveOptions {
        self.options
    }

    /// Resolve one policy for one subject.
    ///
    /// Returns `None` when no target matched: an absent policy is not the
    /// same thing as a present one with every flag false.
    pub fn resolve(
        &self,
        policy: &PolicyRecord,
        subject: &Subject,
        memberships: &MembershipSet,
    ) -> Option<PresenceResult> {
        let matches = match_targets(policy, subject, memberships);
        if matches.include.is_empty() && matches.exclude.is_empty() {
            return None;
        }

        let mut reasons = Vec::new();
        let mut filters = Vec::new();

        for target in &matches.include {
            match target.kind() {
                TargetKind::AllUsers => reasons.push("All Users".to_string()),
                TargetKind::AllDevices => reasons.push("All Devices".to_string()),
                _ if subject.subject_type == SubjectType::Group => {
                    reasons.push(DIRECT_GROUP_REASON.to_string())
                }
                _ => {
                    if let Some(group_id) = target.group_id() {
                        reasons.push(group_name(group_id, memberships).to_string());
                    }
                }
            }
            filters.extend(target.filter.as_ref().and_then(|f| f.describe()));
        }

        for target in &matches.exclude {
            let reason = if subject.subject_type == SubjectType::Group {
                GROUP_EXCLUDED_REASON.to_string()
            } else {
                match target.group_id() {
                    Some(group_id) => format!("Excluded via {}", group_name(group_id, memberships)),
                    None => "Excluded".to_string(),
                }
            };
            reasons.push(reason);
            filters.extend(target.filter.as_ref().and_then(|f| f.describe()));
        }

        let result = PresenceResult {
            present: true,
            excluded: !matches.exclude.is_empty(),
            reasons: dedup_capped(reasons, self.options.display_limit),
            filters: dedup_capped(filters, self.options.display_limit),
        };

        debug!(
            policy_id = %policy.id,
            subject = %subject.key(),
            excluded = result.excluded,
            "Resolved policy presence"
        );

        Some(result)
    }

    /// Presence map for every policy that is present for the subject
    pub fn resolve_all(
        &self,
        subject: &Subject,
        memberships: &MembershipSet,
        policies: &[PolicyRecord],
    ) -> BTreeMap<String, PresenceResult> {
        let mut presence = BTreeMap::new();
        for policy in policies {
            if let Some(result) = self.resolve(policy, subject, memberships) {
                // Policies sharing an id across sources keep their first result
                presence.entry(policy.id.clone()).or_insert(result);
            }
        }
        presence
    }

    /// Full detail view: presence plus policies grouped by the route that reached the subject
    pub fn subject_assignments(
        &self,
        subject: &Subject,
        memberships: &MembershipSet,
        policies: &[PolicyRecord],
    ) -> SubjectAssignments {
        let detail = AssignmentResolver::new(ResolveOptions::detail());
        let presence = detail.resolve_all(subject, memberships, policies);

        let mut all_route: Vec<InheritedPolicy> = Vec::new();
        let mut by_group: HashMap<String, Vec<InheritedPolicy>> = HashMap::new();
        let mut group_order: Vec<String> = Vec::new();

        for policy in policies {
            let matches = match_targets(policy, subject, memberships);
            let tagged = matches
                .include
                .iter()
                .map(|t| (*t, include_intent(t)))
                .chain(matches.exclude.iter().map(|t| (*t, DetailIntent::Excluded)));

            for (target, intent) in tagged {
                let entry = InheritedPolicy {
                    id: policy.id.clone(),
                    name: policy.name.clone(),
                    category: policy.category,
                    intent,
                    platform: policy.platform.clone(),
                    filters: target
                        .filter
                        .as_ref()
                        .and_then(|f| f.describe())
                        .into_iter()
                        .collect(),
                };
                match target.group_id() {
                    Some(group_id) => {
                        if !by_group.contains_key(group_id) {
                            group_order.push(group_id.to_string());
                        }
                        by_group.entry(group_id.to_string()).or_default().push(entry);
                    }
                    None => all_route.push(entry),
                }
            }
        }

        let mut routes = Vec::new();
        if !all_route.is_empty() {
            let via = match subject.subject_type {
                SubjectType::Device => "All Devices",
                _ => "All Users",
            };
            routes.push(AssignmentRoute {
                via: via.to_string(),
                group_id: None,
                policies: all_route,
            });
        }
        for group_id in group_order {
            let via = if subject.subject_type == SubjectType::Group && group_id == subject.id {
                subject.display_label().to_string()
            } else {
                group_name(&group_id, memberships).to_string()
            };
            let policies = by_group.remove(&group_id).unwrap_or_default();
            routes.push(AssignmentRoute {
                via,
                group_id: Some(group_id),
                policies,
            });
        }

        let total_policies = routes
            .iter()
            .flat_map(|r| r.policies.iter().map(|p| p.id.as_str()))
            .collect::<HashSet<_>>()
            .len();

        SubjectAssignments {
            subject: subject.clone(),
            routes,
            presence,
            total_policies,
        }
    }
}

/// Split a policy's targets into the ones including and excluding the subject
fn match_targets<'a>(
    policy: &'a PolicyRecord,
    subject: &Subject,
    memberships: &MembershipSet,
) -> Matches<'a> {
    let all_kind = match subject.subject_type {
        SubjectType::User => Some(TargetKind::AllUsers),
        SubjectType::Device => Some(TargetKind::AllDevices),
        SubjectType::Group => None,
    };
    let is_member = |group_id: &str| match subject.subject_type {
        SubjectType::Group => group_id == subject.id,
        _ => memberships.contains(group_id),
    };

    let mut matches = Matches {
        include: Vec::new(),
        exclude: Vec::new(),
    };
    for target in &policy.assignment_targets {
        match target.kind() {
            kind if Some(kind) == all_kind => matches.include.push(target),
            TargetKind::IncludeGroup if target.group_id().is_some_and(is_member) => {
                matches.include.push(target)
            }
            TargetKind::ExcludeGroup if target.group_id().is_some_and(is_member) => {
                matches.exclude.push(target)
            }
            _ => {}
        }
    }
    matches
}

fn include_intent(target: &AssignmentTarget) -> DetailIntent {
    match target.intent {
        None | Some(AssignmentIntent::Required) => DetailIntent::Required,
        Some(_) => DetailIntent::Available,
    }
}

fn group_name<'a>(group_id: &'a str, memberships: &'a MembershipSet) -> &'a str {
    memberships.name_of(group_id).unwrap_or(group_id)
}

/// Deduplicate in first-seen order, then apply the optional cap
fn dedup_capped(items: Vec<String>, limit: Option<usize>) -> Vec<String> {
    let mut seen = HashSet::new();
    let unique = items.into_iter().filter(|item| seen.insert(item.clone()));
    match limit {
        Some(limit) => unique.take(limit).collect(),
        None => unique.collect(),
    }
}
