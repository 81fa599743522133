//! Progress reporting for backup runs.
//!
//! Two surfaces: per-file `ProgressEvent`s streamed over an mpsc channel to
//! whatever front end started the run, and a shared `ProgressTracker`
//! holding the coarse lifecycle state of each active run for status
//! queries. Tracker state is in-memory only and is not persisted.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::core::models::CopyOutcome;

/// Notifications emitted while a backup runs. This is the core's only
/// interface to the surrounding application.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Resolution finished; totals for rendering percentages.
    Resolved { files: usize, total_bytes: u64 },
    /// One entry processed. `destination` is `None` for entries that never
    /// became a resolved pair (excluded files, unreadable includes).
    File {
        source: PathBuf,
        destination: Option<PathBuf>,
        outcome: CopyOutcome,
    },
}

/// Coarse lifecycle of a run: Resolving -> Copying -> Done, with Failed as
/// the fatal-abort terminal state.
#[derive(Debug, Clone)]
pub enum RunState {
    Resolving,
    Copying { files: u64 },
    Done,
    Failed(String),
}

/// Thread-safe in-memory store for active run state, shared across the
/// application and keyed by run id.
#[derive(Clone, Default)]
pub struct ProgressTracker {
    inner: Arc<RwLock<HashMap<Uuid, RunState>>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update the state of a run. Called on every lifecycle transition.
    pub async fn update(&self, run_id: Uuid, state: RunState) {
        let mut map = self.inner.write().await;
        map.insert(run_id, state);
    }

    pub async fn get(&self, run_id: Uuid) -> Option<RunState> {
        let map = self.inner.read().await;
        map.get(&run_id).cloned()
    }

    /// Remove a run from tracking once its summary has been consumed.
    pub async fn remove(&self, run_id: Uuid) {
        let mut map = self.inner.write().await;
        map.remove(&run_id);
    }

    pub async fn active_count(&self) -> usize {
        let map = self.inner.read().await;
        map.len()
    }
}
