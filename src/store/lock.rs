//! File-based store lock
//!
//! The orchestrator and the auxiliary tool-server process share one state
//! file. Every store operation runs under this lock so writes from either
//! side serialize, whichever process they come from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::StoreError;

/// How long a lock may be held before another process treats it as abandoned.
const LOCK_TTL: Duration = Duration::from_secs(30);

/// Delay between acquisition attempts.
const RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// Contents of the lock file, for diagnostics and staleness checks
#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    token: String,
    acquired_at: DateTime<Utc>,
}

impl LockInfo {
    fn new() -> Self {
        Self {
            pid: std::process::id(),
            token: Uuid::new_v4().to_string(),
            acquired_at: Utc::now(),
        }
    }

    fn is_expired(&self) -> bool {
        let age = Utc::now().signed_duration_since(self.acquired_at);
        age.to_std().map(|age| age > LOCK_TTL).unwrap_or(false)
    }
}

/// Guard over the store lock file; released on drop
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
}

impl StoreLock {
    /// Acquire the lock, waiting up to `timeout` for the current holder.
    ///
    /// A lock file older than the TTL is treated as left behind by a dead
    /// process and broken.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, StoreError> {
        let deadline = Instant::now() + timeout;
        loop {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
            {
                Ok(file) => {
                    let info = LockInfo::new();
                    serde_json::to_writer(&file, &info).map_err(StoreError::Corrupt)?;
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if Self::break_if_stale(path) {
                        continue;
                    }
                    if Instant::now() >= deadline {
                        return Err(StoreError::LockTimeout {
                            path: path.to_path_buf(),
                            timeout,
                        });
                    }
                    std::thread::sleep(RETRY_INTERVAL);
                }
                Err(e) => return Err(StoreError::Io(e)),
            }
        }
    }

    /// Remove the lock file if its holder has exceeded the TTL.
    fn break_if_stale(path: &Path) -> bool {
        let stale = match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str::<LockInfo>(&contents)
                .map(|info| info.is_expired())
                // Unreadable contents mean a writer died mid-write.
                .unwrap_or(true),
            Err(_) => return false,
        };
        if stale {
            tracing::warn!("breaking stale store lock at {}", path.display());
            return fs::remove_file(path).is_ok();
        }
        false
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!("failed to release store lock {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_and_release() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.lock");

        let lock = StoreLock::acquire(&path, Duration::from_millis(100)).unwrap();
        assert!(path.exists());
        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn second_acquire_times_out_while_held() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.lock");

        let _held = StoreLock::acquire(&path, Duration::from_millis(100)).unwrap();
        let err = StoreLock::acquire(&path, Duration::from_millis(80)).unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout { .. }));
    }

    #[test]
    fn stale_lock_is_broken() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.lock");

        let old = LockInfo {
            pid: 0,
            token: "dead".into(),
            acquired_at: Utc::now() - chrono::Duration::seconds(120),
        };
        fs::write(&path, serde_json::to_string(&old).unwrap()).unwrap();

        let lock = StoreLock::acquire(&path, Duration::from_millis(100)).unwrap();
        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn garbage_lock_contents_are_treated_as_stale() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.lock");
        fs::write(&path, "not json").unwrap();

        StoreLock::acquire(&path, Duration::from_millis(100)).unwrap();
    }
}
