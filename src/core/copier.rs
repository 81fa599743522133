//! Single-file copy with the overwrite-if-newer policy.
//!
//! The destination is overwritten only when the source's modification time
//! is strictly later. Equal timestamps count as not newer, so a copy
//! followed by an unchanged re-run always skips: after a successful copy
//! the source mtime is applied to the destination.

use filetime::FileTime;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::debug;

use crate::core::models::{CopyOutcome, ResolvedPair};

/// Buffer size for file I/O operations (128KB for optimal throughput)
const BUFFER_SIZE: usize = 128 * 1024;

/// Copy one resolved pair. Never panics and never aborts the batch; every
/// I/O problem is folded into a `Failed` outcome.
pub fn copy_pair(pair: &ResolvedPair, sync_files: bool) -> CopyOutcome {
    match copy_inner(pair, sync_files) {
        Ok(outcome) => outcome,
        Err(reason) => CopyOutcome::Failed { reason },
    }
}

fn copy_inner(pair: &ResolvedPair, sync_files: bool) -> Result<CopyOutcome, String> {
    let source_meta = fs::metadata(&pair.source)
        .map_err(|e| format!("failed to read source metadata: {e}"))?;
    let source_mtime = FileTime::from_last_modification_time(&source_meta);

    if let Ok(dest_meta) = fs::metadata(&pair.destination) {
        let dest_mtime = FileTime::from_last_modification_time(&dest_meta);
        if source_mtime <= dest_mtime {
            return Ok(CopyOutcome::SkippedNotNewer);
        }
    }

    if let Some(parent) = pair.destination.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("failed to create {}: {e}", parent.display()))?;
    }

    let bytes = write_contents(&pair.source, &pair.destination, sync_files)?;

    let atime = FileTime::from_last_access_time(&source_meta);
    if let Err(e) = filetime::set_file_times(&pair.destination, atime, source_mtime) {
        debug!(
            dest = %pair.destination.display(),
            error = %e,
            "failed to preserve file timestamps"
        );
    }

    Ok(CopyOutcome::Copied { bytes })
}

fn write_contents(source: &Path, dest: &Path, sync_files: bool) -> Result<u64, String> {
    let source_file =
        File::open(source).map_err(|e| format!("failed to open source file: {e}"))?;
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, source_file);

    let dest_file =
        File::create(dest).map_err(|e| format!("failed to create destination file: {e}"))?;
    let mut writer = BufWriter::with_capacity(BUFFER_SIZE, dest_file);

    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut bytes_written: u64 = 0;

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .map_err(|e| format!("failed to read from source: {e}"))?;
        if bytes_read == 0 {
            break;
        }
        writer
            .write_all(&buffer[..bytes_read])
            .map_err(|e| format!("failed to write to destination: {e}"))?;
        bytes_written += bytes_read as u64;
    }

    writer
        .flush()
        .map_err(|e| format!("failed to flush destination file: {e}"))?;

    if sync_files {
        let inner = writer
            .into_inner()
            .map_err(|e| format!("failed to get inner file handle: {}", e.error()))?;
        inner
            .sync_all()
            .map_err(|e| format!("failed to sync file: {e}"))?;
    }

    Ok(bytes_written)
}
