pub mod copier;
pub mod models;
pub mod progress;
pub mod resolver;
pub mod runner;

pub use models::{
    BackupSet, CopyOutcome, ExcludeRule, FatalError, FileFailure, ResolvedPair, RunSummary,
};
pub use progress::{ProgressEvent, ProgressTracker, RunState};
pub use resolver::{IncludeError, Resolution, resolve};
pub use runner::BackupRunner;
