//! Profile loading: a TOML file merged with `EZBAK_*` environment
//! variables and CLI overrides, in increasing precedence.

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::models::{BackupSet, ExcludeRule};

fn default_sync_files() -> bool {
    true
}

/// A backup profile: what to copy, what to skip, where it goes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Destination root the backup is mirrored under.
    pub destination: PathBuf,
    /// Files and directories to back up.
    #[serde(default)]
    pub include: Vec<PathBuf>,
    /// Exact paths to leave out.
    #[serde(default)]
    pub exclude_paths: Vec<PathBuf>,
    /// Directories to leave out, subtree included.
    #[serde(default)]
    pub exclude_dirs: Vec<PathBuf>,
    /// File-name suffixes to leave out, e.g. ".tmp".
    #[serde(default)]
    pub exclude_extensions: Vec<String>,
    /// Where run records are appended; history is disabled when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_file: Option<PathBuf>,
    /// Whether to fsync each file after writing.
    #[serde(default = "default_sync_files")]
    pub sync_files: bool,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub json_logs: bool,
}

impl Profile {
    /// Load a profile from a TOML file, layering `EZBAK_*` environment
    /// variables and any serialized CLI overrides on top.
    pub fn load<O: Serialize>(path: &Path, overrides: Option<&O>) -> Result<Self> {
        let mut figment = Figment::from(Toml::file(path)).merge(Env::prefixed("EZBAK_"));
        if let Some(overrides) = overrides {
            figment = figment.merge(Serialized::defaults(overrides));
        }
        figment
            .extract()
            .with_context(|| format!("failed to load profile {}", path.display()))
    }

    /// Collapse the profile's rule lists into the core's backup set.
    pub fn backup_set(&self) -> BackupSet {
        let mut excludes = Vec::new();
        excludes.extend(self.exclude_paths.iter().cloned().map(ExcludeRule::Path));
        excludes.extend(self.exclude_dirs.iter().cloned().map(ExcludeRule::Directory));
        excludes.extend(
            self.exclude_extensions
                .iter()
                .cloned()
                .map(ExcludeRule::Extension),
        );
        BackupSet {
            includes: self.include.clone(),
            excludes,
        }
    }

    /// Starter profile written by `ezbak init`.
    pub fn template() -> Self {
        Self {
            destination: PathBuf::from("/mnt/backup"),
            include: Vec::new(),
            exclude_paths: Vec::new(),
            exclude_dirs: Vec::new(),
            exclude_extensions: vec![".tmp".into(), ".part".into()],
            history_file: None,
            sync_files: true,
            verbose: false,
            json_logs: false,
        }
    }

    pub fn write_template(path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(&Self::template()).context("failed to serialize profile")?;
        std::fs::write(path, content)
            .with_context(|| format!("failed to write profile {}", path.display()))
    }
}
