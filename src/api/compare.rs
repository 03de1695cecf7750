//! Multi-subject comparison endpoints

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    models::{ComparisonResult, Subject, SubjectType},
    services::{ComputationState, LogProgress},
    utils::AppError,
    AppState,
};

/// Create routes for comparison endpoints
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(run_comparison))
        .route("/latest", get(latest_comparison).delete(clear_comparison))
}

/// A subject picked for comparison
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubjectInput {
    #[serde(rename = "type")]
    pub subject_type: SubjectType,
    #[validate(length(min = 1, message = "subject id must not be empty"))]
    pub id: String,
    /// Display label; looked up when absent
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CompareRequest {
    #[validate(
        length(min = 2, message = "at least two subjects are required"),
        nested
    )]
    pub subjects: Vec<SubjectInput>,
    #[serde(default)]
    pub include_settings_diff: bool,
    /// Reload the policy inventory before comparing
    #[serde(default)]
    pub refresh: bool,
}

async fn resolve_subject(state: &AppState, input: &SubjectInput) -> Result<Subject, AppError> {
    match input.label.as_deref().map(str::trim) {
        Some(label) if !label.is_empty() => {
            Ok(Subject::new(input.subject_type, input.id.trim(), label))
        }
        _ => {
            state
                .directory
                .describe_subject(input.subject_type, input.id.trim())
                .await
        }
    }
}

/// Compare how policies land on two or more subjects
///
/// Starting a comparison supersedes any one still running.
async fn run_comparison(
    State(state): State<AppState>,
    Json(payload): Json<CompareRequest>,
) -> Result<Json<ComparisonResult>, AppError> {
    payload.validate()?;

    let subjects = try_join_all(payload.subjects.iter().map(|s| resolve_subject(&state, s))).await?;

    let inventory = if payload.refresh {
        state.inventory.refresh(&LogProgress).await?
    } else {
        state.inventory.load(&LogProgress).await?
    };

    let settings = payload.include_settings_diff.then_some(&state.settings);
    let result = state
        .comparator
        .run(
            &state.session,
            &subjects,
            &inventory.policies,
            settings,
            &LogProgress,
        )
        .await?;

    Ok(Json(result))
}

/// State of the most recent comparison
async fn latest_comparison(
    State(state): State<AppState>,
) -> Json<ComputationState<ComparisonResult>> {
    Json(state.session.state().await)
}

/// Cancel any running comparison and forget the last result
async fn clear_comparison(State(state): State<AppState>) -> StatusCode {
    state.session.reset().await;
    StatusCode::NO_CONTENT
}
