//! Size-based rotation of the daemon's stdout/stderr log files.
//!
//! `daemon.log` becomes `daemon.log.1`, `.1` becomes `.2`, and so on up to
//! [`RotationPolicy::max_files`]; the oldest copy is dropped.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    pub max_bytes: u64,
    pub max_files: usize,
}

impl Default for RotationPolicy {
    /// 10 MiB, five backups.
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            max_files: 5,
        }
    }
}

/// Rotate `log_path` once it reaches `policy.max_bytes`.
///
/// Returns whether a rotation happened. A missing file is not an error.
pub fn rotate_if_needed(log_path: &Path, policy: RotationPolicy) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if size < policy.max_bytes || policy.max_files == 0 {
        return Ok(false);
    }

    let oldest = backup_path(log_path, policy.max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..policy.max_files).rev() {
        let from = backup_path(log_path, n);
        if from.exists() {
            fs::rename(&from, backup_path(log_path, n + 1))?;
        }
    }
    fs::rename(log_path, backup_path(log_path, 1))?;

    // The daemon's redirected stdout keeps writing to the old inode otherwise.
    fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(log_path)?;
    Ok(true)
}

/// Rotate both daemon logs under `home`. Failures are logged, never fatal.
pub fn rotate_logs(home: &Path) {
    let policy = RotationPolicy::default();
    for log_path in [
        crate::paths::stdout_log_path(home),
        crate::paths::stderr_log_path(home),
    ] {
        match rotate_if_needed(&log_path, policy) {
            Ok(true) => tracing::info!(path = %log_path.display(), "log file rotated"),
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(path = %log_path.display(), error = %err, "log rotation failed")
            }
        }
    }
}

fn backup_path(base: &Path, n: usize) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("daemon.log");
    base.with_file_name(format!("{name}.{n}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SMALL: RotationPolicy = RotationPolicy {
        max_bytes: 16,
        max_files: 3,
    };

    #[test]
    fn small_file_is_left_alone() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("daemon.log");
        fs::write(&log, "short").unwrap();

        assert!(!rotate_if_needed(&log, SMALL).unwrap());
        assert!(!backup_path(&log, 1).exists());
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(!rotate_if_needed(&dir.path().join("none.log"), SMALL).unwrap());
    }

    #[test]
    fn oversized_file_moves_to_first_backup() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("daemon.log");
        fs::write(&log, "x".repeat(32)).unwrap();

        assert!(rotate_if_needed(&log, SMALL).unwrap());
        assert_eq!(fs::metadata(&log).unwrap().len(), 0);
        assert_eq!(fs::read_to_string(backup_path(&log, 1)).unwrap().len(), 32);
    }

    #[test]
    fn backups_shift_and_are_capped() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("daemon-err.log");

        for round in 0..5u8 {
            fs::write(&log, vec![b'a' + round; 20]).unwrap();
            rotate_if_needed(&log, SMALL).unwrap();
        }

        // newest first: e, d, c
        assert_eq!(fs::read(backup_path(&log, 1)).unwrap()[0], b'e');
        assert_eq!(fs::read(backup_path(&log, 3)).unwrap()[0], b'c');
        assert!(!backup_path(&log, 4).exists());
    }

    #[test]
    fn default_policy_matches_daemon_limits() {
        let policy = RotationPolicy::default();
        assert_eq!(policy.max_bytes, 10 * 1024 * 1024);
        assert_eq!(policy.max_files, 5);
    }
}
