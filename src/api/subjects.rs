//! Subject lookup and single-subject assignment endpoints

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::info;

use crate::{
    models::{Subject, SubjectAssignments, SubjectType},
    services::LogProgress,
    utils::AppError,
    AppState,
};

/// Create routes for subject endpoints
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/{type}/search", get(search_subjects))
        .route("/{type}/{id}", get(get_subject))
        .route("/{type}/{id}/assignments", get(get_subject_assignments))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// Users, devices or groups matching a name prefix
async fn search_subjects(
    State(state): State<AppState>,
    Path(subject_type): Path<String>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Subject>>, AppError> {
    let subject_type: SubjectType = subject_type.parse()?;
    let results = state
        .directory
        .search_subjects(subject_type, query.q.trim())
        .await?;
    Ok(Json(results))
}

/// Look up one subject
async fn get_subject(
    State(state): State<AppState>,
    Path((subject_type, id)): Path<(String, String)>,
) -> Result<Json<Subject>, AppError> {
    let subject_type: SubjectType = subject_type.parse()?;
    let subject = state.directory.describe_subject(subject_type, &id).await?;
    Ok(Json(subject))
}

/// Every policy reaching a subject, grouped by the route that reached it
async fn get_subject_assignments(
    State(state): State<AppState>,
    Path((subject_type, id)): Path<(String, String)>,
) -> Result<Json<SubjectAssignments>, AppError> {
    let subject_type: SubjectType = subject_type.parse()?;
    let subject = state.directory.describe_subject(subject_type, &id).await?;

    let inventory = state.inventory.load(&LogProgress).await?;
    let memberships = state.memberships.resolve(&subject).await?;
    let assignments =
        state
            .detail_resolver
            .subject_assignments(&subject, &memberships, &inventory.policies);

    info!(
        subject = %subject.key(),
        routes = assignments.routes.len(),
        policies = assignments.total_policies,
        "Resolved subject assignments"
    );
    Ok(Json(assignments))
}
