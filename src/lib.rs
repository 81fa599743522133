//! Batch file backup: include/exclude resolution and overwrite-if-newer
//! copying, with per-file progress reporting and a persistent run history.

pub mod config;
pub mod core;
pub mod history;
pub mod logging;
