//! Comparison session state
//!
//! Each run captures a generation number when it starts. Starting a new run
//! cancels the previous one, and a result is only committed if its generation
//! is still the latest, so a stale computation can never overwrite a newer one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::utils::{AppError, AppResult};

/// Observable state of the latest computation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ComputationState<T> {
    Idle,
    Loading {
        generation: u64,
        started_at: DateTime<Utc>,
    },
    Success {
        generation: u64,
        completed_at: DateTime<Utc>,
        result: T,
    },
    Error {
        generation: u64,
        error_type: String,
        message: String,
    },
}

/// Ticket for one run; dropped tickets are harmless
#[derive(Debug, Clone)]
pub struct RunHandle {
    generation: u64,
    token: CancellationToken,
}

impl RunHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Cancellation token tripped when a newer run begins
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

struct Inner<T> {
    state: ComputationState<T>,
    token: CancellationToken,
}

/// Holds the latest comparison result and guards against stale commits
pub struct CompareSession<T> {
    generation: AtomicU64,
    inner: RwLock<Inner<T>>,
}

impl<T: Clone> CompareSession<T> {
    pub fn new() -> Self {
        Self {
            generation: AtomicU64::new(0),
            inner: RwLock::new(Inner {
                state: ComputationState::Idle,
                token: CancellationToken::new(),
            }),
        }
    }

    /// Start a new run, cancelling whichever run was in flight
    pub async fn begin(&self) -> RunHandle {
        let mut inner = self.inner.write().await;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        inner.token.cancel();
        inner.token = CancellationToken::new();
        inner.state = ComputationState::Loading {
            generation,
            started_at: Utc::now(),
        };
        debug!(generation, "Comparison run started");

        RunHandle {
            generation,
            token: inner.token.clone(),
        }
    }

    /// Store a run's outcome if the run is still current.
    ///
    /// Returns `false` and drops the outcome when a newer run has begun.
    pub async fn commit(&self, handle: &RunHandle, outcome: &AppResult<T>) -> bool {
        let mut inner = self.inner.write().await;
        if handle.generation != self.generation.load(Ordering::SeqCst) {
            debug!(generation = handle.generation, "Discarding stale comparison result");
            return false;
        }

        inner.state = match outcome {
            Ok(result) => ComputationState::Success {
                generation: handle.generation,
                completed_at: Utc::now(),
                result: result.clone(),
            },
            Err(e) => ComputationState::Error {
                generation: handle.generation,
                error_type: e.error_type().to_string(),
                message: e.to_string(),
            },
        };
        true
    }

    /// Cancel the current run and return to idle
    pub async fn reset(&self) {
        let mut inner = self.inner.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        inner.token.cancel();
        inner.token = CancellationToken::new();
        inner.state = ComputationState::Idle;
    }

    pub async fn state(&self) -> ComputationState<T> {
        self.inner.read().await.state.clone()
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

impl<T: Clone> Default for CompareSession<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> CompareSession<T> {
    /// Like [`CompareSession::begin`], but the returned guard records the run
    /// as cancelled if it is dropped before [`RunGuard::finish`].
    pub async fn start(self: &Arc<Self>) -> RunGuard<T> {
        let handle = self.begin().await;
        RunGuard {
            session: Arc::clone(self),
            handle,
            finished: false,
        }
    }
}

/// Keeps a run's session state from being left in `Loading`
pub struct RunGuard<T: Clone + Send + Sync + 'static> {
    session: Arc<CompareSession<T>>,
    handle: RunHandle,
    finished: bool,
}

impl<T: Clone + Send + Sync + 'static> RunGuard<T> {
    pub fn handle(&self) -> &RunHandle {
        &self.handle
    }

    /// Commit the run's outcome; see [`CompareSession::commit`]
    pub async fn finish(mut self, outcome: &AppResult<T>) -> bool {
        self.finished = true;
        self.session.commit(&self.handle, outcome).await
    }
}

impl<T: Clone + Send + Sync + 'static> Drop for RunGuard<T> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let session = Arc::clone(&self.session);
        let handle = self.handle.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    let outcome: AppResult<T> = Err(AppError::Cancelled(format!(
                        "comparison run {} was abandoned before completing",
                        handle.generation
                    )));
                    if session.commit(&handle, &outcome).await {
                        debug!(generation = handle.generation, "Abandoned comparison run recorded");
                    }
                });
            }
            Err(_) => {
                warn!(generation = self.handle.generation, "Comparison run dropped outside a runtime");
            }
        }
    }
}

/// Run a future unless the handle is cancelled first
pub async fn run_cancellable<T, F>(handle: &RunHandle, fut: F) -> AppResult<T>
where
    F: std::future::Future<Output = AppResult<T>>,
{
    tokio::select! {
        _ = handle.token.cancelled() => Err(AppError::Cancelled(format!(
            "comparison run {} superseded",
            handle.generation
        ))),
        result = fut => result,
    }
}
