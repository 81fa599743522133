//! Run orchestration: resolve the backup set, then copy each pair
//! sequentially, reporting per-file outcomes as it goes.
//!
//! The pipeline is linear (Resolving -> Copying -> Done) with no rollback;
//! a partially completed run leaves copied files in place, and re-running
//! converges to the same end state.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::core::copier;
use crate::core::models::{BackupSet, CopyOutcome, FatalError, FileFailure, RunSummary};
use crate::core::progress::{ProgressEvent, ProgressTracker, RunState};
use crate::core::resolver;

/// Executes backup runs. Filesystem work happens on a blocking worker
/// thread; one file at a time, never two writers to the same destination.
pub struct BackupRunner {
    /// Whether to fsync each file after writing (safer but slower)
    pub sync_files: bool,
    tracker: ProgressTracker,
}

impl BackupRunner {
    pub fn new(tracker: ProgressTracker) -> Self {
        Self {
            sync_files: true,
            tracker,
        }
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    /// Run one backup: resolve, then copy. Per-file problems are folded
    /// into the summary; only an unusable destination root is fatal.
    ///
    /// Cancellation is cooperative and checked between files, never
    /// mid-copy.
    pub async fn run(
        &self,
        run_id: Uuid,
        set: BackupSet,
        destination_root: PathBuf,
        tx: mpsc::Sender<ProgressEvent>,
        cancel: CancellationToken,
    ) -> Result<RunSummary, FatalError> {
        let span = info_span!(
            "backup_run",
            id = %run_id,
            destination = %destination_root.display()
        );
        self.run_inner(run_id, set, destination_root, tx, cancel)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        run_id: Uuid,
        set: BackupSet,
        destination_root: PathBuf,
        tx: mpsc::Sender<ProgressEvent>,
        cancel: CancellationToken,
    ) -> Result<RunSummary, FatalError> {
        let start_time = Instant::now();

        if let Err(e) = ensure_destination(&destination_root) {
            self.tracker
                .update(run_id, RunState::Failed(e.to_string()))
                .await;
            return Err(e);
        }

        self.tracker.update(run_id, RunState::Resolving).await;
        info!("resolving backup set");

        let resolution = {
            let root = destination_root.clone();
            tokio::task::spawn_blocking(move || resolver::resolve(&set, &root))
                .await
                .map_err(|e| FatalError::Worker(e.to_string()))?
        };

        info!(
            files = resolution.pairs.len(),
            total_bytes = resolution.total_bytes,
            excluded = resolution.excluded.len(),
            unreadable = resolution.errors.len(),
            "resolution complete"
        );

        let _ = tx
            .send(ProgressEvent::Resolved {
                files: resolution.pairs.len(),
                total_bytes: resolution.total_bytes,
            })
            .await;

        let mut summary = RunSummary::default();

        for path in &resolution.excluded {
            summary.skipped_excluded += 1;
            let _ = tx
                .send(ProgressEvent::File {
                    source: path.clone(),
                    destination: None,
                    outcome: CopyOutcome::SkippedExcluded,
                })
                .await;
        }

        for err in &resolution.errors {
            warn!(path = %err.path.display(), reason = %err.reason, "include entry skipped");
            summary.failures.push(FileFailure {
                path: err.path.clone(),
                reason: err.reason.clone(),
            });
            let _ = tx
                .send(ProgressEvent::File {
                    source: err.path.clone(),
                    destination: None,
                    outcome: CopyOutcome::Failed {
                        reason: err.reason.clone(),
                    },
                })
                .await;
        }

        self.tracker
            .update(
                run_id,
                RunState::Copying {
                    files: resolution.pairs.len() as u64,
                },
            )
            .await;

        let mut summary = {
            let pairs = resolution.pairs;
            let sync_files = self.sync_files;
            let tx = tx.clone();
            let cancel = cancel.clone();
            tokio::task::spawn_blocking(move || {
                for pair in &pairs {
                    if cancel.is_cancelled() {
                        info!("cancellation requested, stopping before next file");
                        summary.cancelled = true;
                        break;
                    }

                    debug!(source = %pair.source.display(), size = pair.size, "copying file");
                    let outcome = copier::copy_pair(pair, sync_files);
                    summary.record(&pair.source, &outcome);

                    let _ = tx.blocking_send(ProgressEvent::File {
                        source: pair.source.clone(),
                        destination: Some(pair.destination.clone()),
                        outcome,
                    });
                }
                summary
            })
            .await
            .map_err(|e| FatalError::Worker(e.to_string()))?
        };

        summary.duration_secs = start_time.elapsed().as_secs();
        self.tracker.update(run_id, RunState::Done).await;

        info!(
            copied = summary.copied,
            skipped = summary.skipped_not_newer,
            excluded = summary.skipped_excluded,
            failed = summary.failed(),
            bytes = summary.bytes_copied,
            cancelled = summary.cancelled,
            "backup run complete"
        );

        Ok(summary)
    }
}

/// The destination root must be creatable and writable before any work
/// starts; read-only mounts only surface on an actual write attempt, so a
/// marker file is probed and removed.
fn ensure_destination(root: &Path) -> Result<(), FatalError> {
    fs::create_dir_all(root).map_err(|e| FatalError::DestinationUnavailable {
        path: root.to_path_buf(),
        source: e,
    })?;

    let probe = root.join(".ezbak-write-probe");
    match File::create(&probe) {
        Ok(_) => {
            let _ = fs::remove_file(&probe);
            Ok(())
        }
        Err(e) => Err(FatalError::DestinationReadOnly {
            path: root.to_path_buf(),
            source: e,
        }),
    }
}
