use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Task;
use crate::errors::{IrisError, IrisResult};
use crate::lock::{LockManager, TASKS_LOCK};
use crate::util::write_json_atomic;

/// On-disk shape of `tasks.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryFile {
    #[serde(default)]
    pub tasks: BTreeMap<u64, Task>,
    #[serde(default = "first_id")]
    pub next_id: u64,
}

fn first_id() -> u64 {
    1
}

impl Default for RegistryFile {
    fn default() -> Self {
        Self {
            tasks: BTreeMap::new(),
            next_id: first_id(),
        }
    }
}

/// Durable collection of every task in a workspace.
///
/// Every mutation holds the `tasks` lock across load → modify → atomic write,
/// so ids are never reused and concurrent updates are not lost.
pub struct TaskRegistry {
    path: PathBuf,
    locks: LockManager,
}

impl TaskRegistry {
    pub fn new(state_dir: &Path, locks: LockManager) -> Self {
        Self {
            path: state_dir.join("tasks.json"),
            locks,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self) -> IrisResult<RegistryFile> {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(RegistryFile::default()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(RegistryFile::default()),
            Err(err) => Err(err.into()),
        }
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut RegistryFile) -> IrisResult<T>) -> IrisResult<T> {
        let _guard = self.locks.acquire(TASKS_LOCK)?;
        let mut file = self.read_file()?;
        let out = f(&mut file)?;
        write_json_atomic(&self.path, &file)?;
        Ok(out)
    }

    /// Create a pending task with the next id.
    pub fn create(&self, goal: &str, files: Vec<String>) -> IrisResult<Task> {
        self.mutate(|reg| {
            let id = reg.next_id;
            reg.next_id += 1;
            let task = Task::new(id, goal, files);
            reg.tasks.insert(id, task.clone());
            debug!(task_id = id, "task created");
            Ok(task)
        })
    }

    pub fn get(&self, id: u64) -> IrisResult<Option<Task>> {
        Ok(self.read_file()?.tasks.get(&id).cloned())
    }

    /// Like [`TaskRegistry::get`], but a missing task is an error.
    pub fn require(&self, id: u64) -> IrisResult<Task> {
        self.get(id)?.ok_or(IrisError::TaskNotFound { id })
    }

    /// All tasks, sorted by id.
    pub fn list(&self) -> IrisResult<Vec<Task>> {
        Ok(self.read_file()?.tasks.into_values().collect())
    }

    /// Replace a stored task, refreshing `updated_at`.
    pub fn update(&self, task: &Task) -> IrisResult<Task> {
        self.mutate(|reg| {
            let slot = reg
                .tasks
                .get_mut(&task.id)
                .ok_or(IrisError::TaskNotFound { id: task.id })?;
            *slot = task.clone();
            slot.updated_at = Utc::now();
            Ok(slot.clone())
        })
    }

    /// Apply `f` to a stored task under the lock, refreshing `updated_at`.
    pub fn modify(&self, id: u64, f: impl FnOnce(&mut Task)) -> IrisResult<Task> {
        self.mutate(|reg| {
            let slot = reg
                .tasks
                .get_mut(&id)
                .ok_or(IrisError::TaskNotFound { id })?;
            f(slot);
            slot.updated_at = Utc::now();
            Ok(slot.clone())
        })
    }

    /// Remove a task. Returns whether it existed.
    pub fn delete(&self, id: u64) -> IrisResult<bool> {
        self.mutate(|reg| Ok(reg.tasks.remove(&id).is_some()))
    }
}
