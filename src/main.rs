use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use ezbak::config::Profile;
use ezbak::core::{BackupRunner, CopyOutcome, ProgressEvent, ProgressTracker};
use ezbak::history::{HistoryLog, RunRecord};
use ezbak::logging::{self, LogConfig, LogThrottle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "ezbak")]
#[command(about = "Simple include/exclude file backup", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter profile
    Init {
        #[arg(default_value = "ezbak.toml")]
        path: PathBuf,
    },
    /// Resolve the backup set without copying anything
    Plan(ProfileArgs),
    /// Run a backup
    Run(ProfileArgs),
    /// List past runs from the history log
    History(ProfileArgs),
}

#[derive(Args, Serialize)]
struct ProfileArgs {
    /// Profile file (TOML)
    #[serde(skip)]
    #[arg(long, default_value = "ezbak.toml")]
    profile: PathBuf,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    destination: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    sync_files: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    verbose: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    json_logs: Option<bool>,
}

impl ProfileArgs {
    fn load(&self) -> Result<Profile> {
        Profile::load(&self.profile, Some(self))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { path } => init_profile(&path),
        Commands::Plan(args) => {
            let profile = args.load()?;
            init_logging(&profile);
            plan(&profile)
        }
        Commands::Run(args) => {
            let profile = args.load()?;
            init_logging(&profile);
            run_backup(&profile).await
        }
        Commands::History(args) => {
            let profile = args.load()?;
            show_history(&profile)
        }
    }
}

fn init_logging(profile: &Profile) {
    logging::init(LogConfig {
        json: profile.json_logs,
        verbose: profile.verbose,
    });
}

fn init_profile(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("refusing to overwrite existing profile {}", path.display());
    }
    Profile::write_template(path)?;
    println!("wrote starter profile to {}", path.display());
    Ok(())
}

fn plan(profile: &Profile) -> Result<()> {
    let set = profile.backup_set();
    let resolution = ezbak::core::resolve(&set, &profile.destination);

    for pair in &resolution.pairs {
        println!("{} -> {}", pair.source.display(), pair.destination.display());
    }
    for path in &resolution.excluded {
        println!("excluded: {}", path.display());
    }
    for err in &resolution.errors {
        warn!(path = %err.path.display(), reason = %err.reason, "include entry skipped");
    }

    println!(
        "{} file(s), {} byte(s), {} excluded, {} unreadable",
        resolution.pairs.len(),
        resolution.total_bytes,
        resolution.excluded.len(),
        resolution.errors.len()
    );
    Ok(())
}

async fn run_backup(profile: &Profile) -> Result<()> {
    let run_id = Uuid::now_v7();
    let started_at = Local::now();

    let mut runner = BackupRunner::new(ProgressTracker::new());
    runner.sync_files = profile.sync_files;

    let (tx, mut rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current file");
            interrupt.cancel();
        }
    });

    let consumer = tokio::spawn(async move {
        let throttle = LogThrottle::new(Duration::from_millis(200));
        let mut total = 0usize;
        let mut processed = 0usize;
        while let Some(event) = rx.recv().await {
            match event {
                ProgressEvent::Resolved { files, total_bytes } => {
                    total = files;
                    info!(files, total_bytes, "backup set resolved");
                }
                ProgressEvent::File {
                    source, outcome, ..
                } => {
                    processed += 1;
                    match &outcome {
                        CopyOutcome::Failed { reason } => {
                            error!(file = %source.display(), %reason, "copy failed");
                        }
                        _ if throttle.should_log() => {
                            info!(
                                file = %source.display(),
                                processed,
                                total,
                                outcome = outcome.label(),
                                "progress"
                            );
                        }
                        _ => {}
                    }
                }
            }
        }
    });

    let summary = runner
        .run(
            run_id,
            profile.backup_set(),
            profile.destination.clone(),
            tx,
            cancel,
        )
        .await?;
    let _ = consumer.await;

    println!(
        "copied: {}  up to date: {}  excluded: {}  failed: {}  ({} bytes in {}s)",
        summary.copied,
        summary.skipped_not_newer,
        summary.skipped_excluded,
        summary.failed(),
        summary.bytes_copied,
        summary.duration_secs
    );
    for failure in &summary.failures {
        println!("  failed: {}: {}", failure.path.display(), failure.reason);
    }
    if summary.cancelled {
        println!("run was cancelled before completion");
    }

    if let Some(history_path) = &profile.history_file {
        let record = RunRecord::new(
            run_id,
            started_at,
            Local::now(),
            profile.destination.clone(),
            profile.include.clone(),
            &summary,
        );
        HistoryLog::new(history_path.clone())
            .append(&record)
            .context("failed to record run history")?;
    }

    Ok(())
}

fn show_history(profile: &Profile) -> Result<()> {
    let Some(path) = &profile.history_file else {
        println!("no history_file configured in the profile");
        return Ok(());
    };

    let records = HistoryLog::new(path.clone()).read_all()?;
    if records.is_empty() {
        println!("no runs recorded");
        return Ok(());
    }

    for record in records {
        println!(
            "{}  copied {}  up to date {}  excluded {}  failed {}  {} bytes{}",
            record.started_at.format("%Y-%m-%d %H:%M:%S"),
            record.copied,
            record.skipped_not_newer,
            record.skipped_excluded,
            record.failed,
            record.bytes_copied,
            if record.cancelled { "  (cancelled)" } else { "" }
        );
    }
    Ok(())
}
