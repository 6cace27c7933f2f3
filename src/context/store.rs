use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info};

use super::summary;
use super::{Context, CurrentTask};
use crate::errors::{IrisError, IrisResult};
use crate::journal::JournalFile;
use crate::lock::{LockManager, STATE_LOCK};
use crate::task::{Phase, TaskStatus};
use crate::util::write_json_atomic;

pub const CONTEXT_FILE: &str = "context.json";

/// Reads and writes `context.json` under the `state` lock.
pub struct ContextStore {
    state_dir: PathBuf,
    locks: LockManager,
    summary_max_chars: usize,
}

impl ContextStore {
    pub fn new(state_dir: &Path, locks: LockManager) -> Self {
        Self {
            state_dir: state_dir.to_path_buf(),
            locks,
            summary_max_chars: summary::DEFAULT_MAX_CHARS,
        }
    }

    pub fn with_summary_limit(mut self, max_chars: usize) -> Self {
        self.summary_max_chars = max_chars;
        self
    }

    /// Character cap applied when merging summaries.
    pub fn summary_limit(&self) -> usize {
        self.summary_max_chars
    }

    pub fn path(&self) -> PathBuf {
        self.state_dir.join(CONTEXT_FILE)
    }

    pub fn is_initialized(&self) -> bool {
        self.path().exists()
    }

    /// Create the state directory, a default project and an empty journal.
    /// Returns `false` when the context already existed.
    pub fn initialize(&self, project_name: &str) -> IrisResult<bool> {
        fs::create_dir_all(&self.state_dir)?;
        let _guard = self.locks.acquire(STATE_LOCK)?;
        if self.is_initialized() {
            debug!(path = %self.path().display(), "context already initialized");
            return Ok(false);
        }

        let ctx = Context::new(project_name);
        write_json_atomic(&self.path(), &ctx)?;

        let journal_path = self.state_dir.join(crate::journal::JOURNAL_FILE);
        if !journal_path.exists() {
            write_json_atomic(&journal_path, &JournalFile::default())?;
        }
        info!(project = project_name, id = %ctx.project.id, "context initialized");
        Ok(true)
    }

    fn read(&self) -> IrisResult<Context> {
        let path = self.path();
        if !path.exists() {
            return Err(IrisError::NotInitialized { path });
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write(&self, ctx: &mut Context) -> IrisResult<()> {
        ctx.project.last_updated = Utc::now();
        write_json_atomic(&self.path(), ctx)?;
        debug!(path = %self.path().display(), "context saved");
        Ok(())
    }

    pub fn load(&self) -> IrisResult<Context> {
        self.read()
    }

    /// Overwrite the whole record. Stamps `last_updated`.
    pub fn save(&self, ctx: &mut Context) -> IrisResult<()> {
        let _guard = self.locks.acquire(STATE_LOCK)?;
        self.write(ctx)
    }

    /// Read-modify-write with the lock held throughout.
    pub fn update<T>(&self, f: impl FnOnce(&mut Context) -> IrisResult<T>) -> IrisResult<T> {
        let _guard = self.locks.acquire(STATE_LOCK)?;
        let mut ctx = self.read()?;
        let out = f(&mut ctx)?;
        self.write(&mut ctx)?;
        Ok(out)
    }

    /// Replace the current task wholesale.
    pub fn set_current_task(&self, task: CurrentTask) -> IrisResult<()> {
        self.update(|ctx| {
            ctx.current_task = Some(task);
            Ok(())
        })
    }

    pub fn update_current_task<T>(
        &self,
        f: impl FnOnce(&mut CurrentTask) -> IrisResult<T>,
    ) -> IrisResult<T> {
        self.update(|ctx| f(ctx.current_task_mut()?))
    }

    pub fn update_task_status(&self, status: TaskStatus, phase: Phase) -> IrisResult<()> {
        self.update_current_task(|task| {
            task.status = status;
            task.last_phase = phase;
            Ok(())
        })
    }

    /// Fold `new_info` into the current task's summary. Returns the result.
    pub fn merge_summary(&self, new_info: &str) -> IrisResult<String> {
        let max_chars = self.summary_max_chars;
        self.update_current_task(|task| {
            task.summary = summary::merge(&task.summary, new_info, max_chars);
            Ok(task.summary.clone())
        })
    }
}
