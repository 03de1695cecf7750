//! Policy inventory API endpoints

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    models::{AssignmentStatus, ConfigItem, InventoryInsights, PolicyCategory, PolicyRecord},
    services::{Inventory, LogProgress},
    utils::AppError,
    AppState,
};

const TOP_GROUPS: usize = 5;

/// Create routes for policy endpoints
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_policies))
        .route("/refresh", post(refresh_policies))
        .route("/summary", get(policy_insights))
        .route("/{id}", get(get_policy))
        .route("/{id}/settings", get(get_policy_settings))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListPoliciesQuery {
    pub category: Option<PolicyCategory>,
    /// Bypass the cached inventory
    #[serde(default)]
    pub refresh: bool,
}

/// One row of the policy table
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySummary {
    pub id: String,
    pub name: String,
    pub category: PolicyCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    pub assignment_status: AssignmentStatus,
    pub assigned_to: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyListResponse {
    pub policies: Vec<PolicySummary>,
    pub total: usize,
    /// Source collections missing from this inventory
    pub failed_sources: Vec<String>,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDetail {
    #[serde(flatten)]
    pub policy: PolicyRecord,
    pub assignment_status: AssignmentStatus,
    pub assigned_to: Vec<String>,
}

fn summarize(policy: &PolicyRecord, inventory: &Inventory) -> PolicySummary {
    PolicySummary {
        id: policy.id.clone(),
        name: policy.name.clone(),
        category: policy.category,
        platform: policy.platform.clone(),
        assignment_status: policy.assignment_status(),
        assigned_to: policy.assigned_to(&inventory.group_names),
    }
}

async fn inventory(state: &AppState, refresh: bool) -> Result<Arc<Inventory>, AppError> {
    if refresh {
        state.inventory.refresh(&LogProgress).await
    } else {
        state.inventory.load(&LogProgress).await
    }
}

fn list_response(inventory: &Inventory, category: Option<PolicyCategory>) -> PolicyListResponse {
    let policies: Vec<PolicySummary> = inventory
        .policies
        .iter()
        .filter(|p| category.is_none_or(|c| p.category == c))
        .map(|p| summarize(p, inventory))
        .collect();

    PolicyListResponse {
        total: policies.len(),
        policies,
        failed_sources: inventory.failed_sources.clone(),
        loaded_at: inventory.loaded_at,
    }
}

/// List every policy in the tenant, optionally filtered by category
async fn list_policies(
    State(state): State<AppState>,
    Query(query): Query<ListPoliciesQuery>,
) -> Result<Json<PolicyListResponse>, AppError> {
    let inventory = inventory(&state, query.refresh).await?;
    Ok(Json(list_response(&inventory, query.category)))
}

/// Drop the cached inventory and load it again
async fn refresh_policies(
    State(state): State<AppState>,
) -> Result<Json<PolicyListResponse>, AppError> {
    let inventory = inventory(&state, true).await?;
    Ok(Json(list_response(&inventory, None)))
}

/// Assignment coverage and distribution across the inventory
async fn policy_insights(
    State(state): State<AppState>,
    Query(query): Query<ListPoliciesQuery>,
) -> Result<Json<InventoryInsights>, AppError> {
    let inventory = inventory(&state, query.refresh).await?;
    Ok(Json(inventory.insights(TOP_GROUPS)))
}

async fn find_policy(state: &AppState, id: &str) -> Result<(Arc<Inventory>, PolicyRecord), AppError> {
    let inventory = inventory(state, false).await?;
    let policy = inventory
        .find(id)
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("policy {}", id)))?;
    Ok((inventory, policy))
}

/// Get a single policy with its targets
async fn get_policy(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PolicyDetail>, AppError> {
    let (inventory, policy) = find_policy(&state, &id).await?;
    Ok(Json(PolicyDetail {
        assignment_status: policy.assignment_status(),
        assigned_to: policy.assigned_to(&inventory.group_names),
        policy,
    }))
}

/// Flattened settings configured by a policy
async fn get_policy_settings(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ConfigItem>>, AppError> {
    let (_, policy) = find_policy(&state, &id).await?;
    let items = state.settings.configuration(&policy).await?;
    Ok(Json(items.as_ref().clone()))
}
