//! Cross-process advisory locking over the workspace state directory.
//!
//! Each resource key maps to `<state_dir>/<key>.lock`. Exclusion comes from an
//! OS-level `flock`-style lock (`fs2`), so a holder that crashes releases the
//! lock with its file descriptor and can never wedge later callers. Waiting is
//! bounded: callers get [`IrisError::LockTimeout`] instead of blocking forever.

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::errors::{IrisError, IrisResult};

/// Lock key guarding `context.json` and `journal.json`.
pub const STATE_LOCK: &str = "state";
/// Lock key guarding `tasks.json`.
pub const TASKS_LOCK: &str = "tasks";

const MAX_BACKOFF: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSettings {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(25),
        }
    }
}

/// Diagnostic lease written into the lock file by the current holder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LockLease {
    pub pid: u32,
    pub resource: String,
    pub acquired_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct LockManager {
    dir: PathBuf,
    settings: LockSettings,
}

impl LockManager {
    pub fn new(dir: impl Into<PathBuf>, settings: LockSettings) -> Self {
        Self {
            dir: dir.into(),
            settings,
        }
    }

    pub fn settings(&self) -> LockSettings {
        self.settings
    }

    pub fn lock_path(&self, resource: &str) -> PathBuf {
        self.dir.join(format!("{resource}.lock"))
    }

    /// Acquire `resource` using the configured timeout.
    pub fn acquire(&self, resource: &str) -> IrisResult<LockGuard> {
        self.acquire_with_timeout(resource, self.settings.timeout)
    }

    /// Acquire `resource`, polling with capped backoff until `timeout` elapses.
    pub fn acquire_with_timeout(&self, resource: &str, timeout: Duration) -> IrisResult<LockGuard> {
        fs::create_dir_all(&self.dir)?;
        let path = self.lock_path(resource);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        let start = Instant::now();
        let mut backoff = self.settings.poll_interval;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => break,
                Err(err) if err.kind() == fs2::lock_contended_error().kind() => {
                    let waited = start.elapsed();
                    if waited >= timeout {
                        return Err(IrisError::LockTimeout {
                            resource: resource.to_string(),
                            waited,
                        });
                    }
                    trace!(resource, ?waited, "lock contended, retrying");
                    std::thread::sleep(backoff.min(timeout - waited));
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Err(err) => return Err(err.into()),
            }
        }

        let mut guard = LockGuard {
            file: Some(file),
            path,
            resource: resource.to_string(),
        };
        guard.write_lease()?;
        debug!(resource, waited = ?start.elapsed(), "lock acquired");
        Ok(guard)
    }

    /// Read the lease left by the current (or last) holder, if any.
    pub fn read_lease(&self, resource: &str) -> Option<LockLease> {
        let content = fs::read_to_string(self.lock_path(resource)).ok()?;
        serde_json::from_str(content.trim()).ok()
    }
}

/// Held lock; released on [`LockGuard::release`] or drop.
#[derive(Debug)]
pub struct LockGuard {
    file: Option<File>,
    path: PathBuf,
    resource: String,
}

impl LockGuard {
    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    fn write_lease(&mut self) -> IrisResult<()> {
        let lease = LockLease {
            pid: std::process::id(),
            resource: self.resource.clone(),
            acquired_at: Utc::now(),
        };
        if let Some(file) = self.file.as_mut() {
            file.set_len(0)?;
            file.seek(SeekFrom::Start(0))?;
            serde_json::to_writer(&mut *file, &lease)?;
            file.flush()?;
        }
        Ok(())
    }

    /// Release the lock. Idempotent, and tolerant of the lock file having been
    /// deleted underneath us: the lock lives on the descriptor, not the path.
    pub fn release(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(err) = FileExt::unlock(&file) {
                debug!(resource = %self.resource, %err, "unlock failed, closing descriptor");
            }
            debug!(resource = %self.resource, "lock released");
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.release();
    }
}
