//! Persistent run history: one JSON record per completed run, appended to
//! a JSON-lines file so past backups can be listed without any database.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use tracing::warn;
use uuid::Uuid;

use crate::core::models::RunSummary;

/// One completed run, as recorded in the history log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: Uuid,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub destination: PathBuf,
    pub included: Vec<PathBuf>,
    pub copied: u64,
    pub skipped_not_newer: u64,
    pub skipped_excluded: u64,
    pub failed: u64,
    pub bytes_copied: u64,
    pub cancelled: bool,
}

impl RunRecord {
    pub fn new(
        id: Uuid,
        started_at: DateTime<Local>,
        finished_at: DateTime<Local>,
        destination: PathBuf,
        included: Vec<PathBuf>,
        summary: &RunSummary,
    ) -> Self {
        Self {
            id,
            started_at,
            finished_at,
            destination,
            included,
            copied: summary.copied,
            skipped_not_newer: summary.skipped_not_newer,
            skipped_excluded: summary.skipped_excluded,
            failed: summary.failed(),
            bytes_copied: summary.bytes_copied,
            cancelled: summary.cancelled,
        }
    }
}

/// Append-only JSON-lines history of backup runs.
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn append(&self, record: &RunRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open history log {}", self.path.display()))?;

        let line = serde_json::to_string(record).context("failed to serialize run record")?;
        writeln!(file, "{line}")
            .with_context(|| format!("failed to write history log {}", self.path.display()))
    }

    /// Read every recorded run, oldest first. Malformed lines are skipped
    /// with a warning rather than poisoning the whole log.
    pub fn read_all(&self) -> Result<Vec<RunRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .with_context(|| format!("failed to open history log {}", self.path.display()))?;

        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.context("failed to read history log")?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(error = %e, "skipping malformed history entry"),
            }
        }
        Ok(records)
    }
}
