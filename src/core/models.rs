use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A single exclusion rule applied while resolving the backup set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExcludeRule {
    /// Excludes exactly this path.
    Path(PathBuf),
    /// Excludes this directory and everything beneath it.
    Directory(PathBuf),
    /// Excludes any file whose name ends with this suffix.
    ///
    /// Matching is case-sensitive. A rule without a leading dot is treated
    /// as if it had one, so `"tmp"` matches `a.tmp` but not `stamp`.
    Extension(String),
}

impl ExcludeRule {
    /// Whether this rule excludes the given file path.
    pub fn matches(&self, path: &Path) -> bool {
        match self {
            ExcludeRule::Path(p) => path == p,
            ExcludeRule::Directory(dir) => path.starts_with(dir),
            ExcludeRule::Extension(ext) => {
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    return false;
                };
                let suffix = ext.strip_prefix('.').unwrap_or(ext);
                name.len() > suffix.len()
                    && name.ends_with(suffix)
                    && name.as_bytes()[name.len() - suffix.len() - 1] == b'.'
            }
        }
    }

    /// Extension rules only ever apply to files; path and directory rules
    /// prune a directory and its whole subtree.
    pub fn matches_directory(&self, path: &Path) -> bool {
        match self {
            ExcludeRule::Extension(_) => false,
            _ => self.matches(path),
        }
    }
}

/// Immutable description of one backup: what to copy and what to leave out.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupSet {
    pub includes: Vec<PathBuf>,
    pub excludes: Vec<ExcludeRule>,
}

impl BackupSet {
    pub fn excludes_file(&self, path: &Path) -> bool {
        self.excludes.iter().any(|rule| rule.matches(path))
    }

    pub fn excludes_directory(&self, path: &Path) -> bool {
        self.excludes.iter().any(|rule| rule.matches_directory(path))
    }
}

/// A concrete (source, destination) file mapping produced by resolution.
///
/// The destination mirrors the source's position under its include root,
/// rebased onto the destination root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPair {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub size: u64,
}

/// Per-file result of the copy step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CopyOutcome {
    Copied { bytes: u64 },
    SkippedNotNewer,
    SkippedExcluded,
    Failed { reason: String },
}

impl CopyOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CopyOutcome::Copied { .. } => "copied",
            CopyOutcome::SkippedNotNewer => "skipped (up to date)",
            CopyOutcome::SkippedExcluded => "excluded",
            CopyOutcome::Failed { .. } => "failed",
        }
    }
}

/// One file that could not be backed up, with the reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Aggregate result of a backup run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub copied: u64,
    pub skipped_not_newer: u64,
    pub skipped_excluded: u64,
    pub bytes_copied: u64,
    pub failures: Vec<FileFailure>,
    /// True when the run was stopped between files by the caller.
    pub cancelled: bool,
    pub duration_secs: u64,
}

impl RunSummary {
    pub fn record(&mut self, path: &Path, outcome: &CopyOutcome) {
        match outcome {
            CopyOutcome::Copied { bytes } => {
                self.copied += 1;
                self.bytes_copied += bytes;
            }
            CopyOutcome::SkippedNotNewer => self.skipped_not_newer += 1,
            CopyOutcome::SkippedExcluded => self.skipped_excluded += 1,
            CopyOutcome::Failed { reason } => self.failures.push(FileFailure {
                path: path.to_path_buf(),
                reason: reason.clone(),
            }),
        }
    }

    pub fn failed(&self) -> u64 {
        self.failures.len() as u64
    }
}

/// Errors that abort an entire run before any file is copied.
///
/// Per-file problems never take this form; they are recorded in the summary
/// and the run continues.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("destination root {path} is not accessible: {source}")]
    DestinationUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("destination root {path} is not writable: {source}")]
    DestinationReadOnly {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("backup worker failed: {0}")]
    Worker(String),
}
