//! Size-based rotation for the agent's log files.
//!
//! Rotates `warden.log` and `warden-err.log` when they exceed 5 MiB. Keeps a
//! single backup per file: `warden.log` → `warden.log.old`, replacing any
//! previous backup.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Maximum log file size before rotation (5 MiB).
pub const MAX_LOG_BYTES: u64 = 5 * 1024 * 1024;

/// Rotate `log_path` if its size meets or exceeds `max_bytes`.
///
/// Returns `true` if rotation occurred, `false` if the file was under the
/// threshold or did not exist yet.
pub fn rotate_if_needed(log_path: &Path, max_bytes: u64) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };

    if size < max_bytes {
        return Ok(false);
    }

    // rename replaces an existing backup in one step.
    fs::rename(log_path, backup_path(log_path))?;

    // Recreate the live file so the writer always has a valid path.
    fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(log_path)?;

    Ok(true)
}

/// Rotate both agent log files under `home`.
///
/// A failure on one file is logged and does not block the other.
pub fn rotate_logs(home: &Path) {
    let stdout_log = crate::paths::stdout_log_path(home);
    let stderr_log = crate::paths::stderr_log_path(home);

    for log_path in [&stdout_log, &stderr_log] {
        match rotate_if_needed(log_path, MAX_LOG_BYTES) {
            Ok(true) => tracing::info!(path = %log_path.display(), "log file rotated"),
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(path = %log_path.display(), error = %err, "log rotation failed")
            }
        }
    }
}

/// `<name>.old` sibling of `base`.
fn backup_path(base: &Path) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("warden.log");
    base.with_file_name(format!("{name}.old"))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
