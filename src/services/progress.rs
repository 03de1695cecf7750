//! Progress reporting for long-running loads and comparisons

use std::fmt;

use serde::Serialize;
use tracing::info;

/// Stage of a load or comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoadingStage {
    Authenticating,
    #[serde(rename = "Fetching Policies")]
    FetchingPolicies,
    Processing,
    #[serde(rename = "Resolving Groups")]
    ResolvingGroups,
    #[serde(rename = "Fetching Groups")]
    FetchingGroups,
    Matching,
    Finalizing,
    Complete,
}

impl fmt::Display for LoadingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LoadingStage::Authenticating => "Authenticating",
            LoadingStage::FetchingPolicies => "Fetching Policies",
            LoadingStage::Processing => "Processing",
            LoadingStage::ResolvingGroups => "Resolving Groups",
            LoadingStage::FetchingGroups => "Fetching Groups",
            LoadingStage::Matching => "Matching",
            LoadingStage::Finalizing => "Finalizing",
            LoadingStage::Complete => "Complete",
        };
        f.write_str(label)
    }
}

/// One progress notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    pub stage: LoadingStage,
    /// Percentage, 0 to 100
    pub progress: u8,
    pub details: String,
}

impl ProgressUpdate {
    pub fn new(stage: LoadingStage, progress: u8, details: impl Into<String>) -> Self {
        Self {
            stage,
            progress: progress.min(100),
            details: details.into(),
        }
    }
}

/// Receives progress updates; passed explicitly into each operation
pub trait ProgressSink: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        self(update)
    }
}

/// Discards every update
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _update: ProgressUpdate) {}
}

/// Forwards updates to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, update: ProgressUpdate) {
        info!(stage = %update.stage, progress = update.progress, "{}", update.details);
    }
}
