//! Checkpoint cleanup: `iris prune`.

use anyhow::Result;
use console::style;

use iris::checkpoint::CheckpointStore;
use iris::config::Config;
use iris::task::{TaskRegistry, TaskStatus};

/// Delete checkpoints of finished tasks. `all` also clears failed and paused
/// tasks, and tasks the registry no longer knows.
pub fn cmd_prune(config: &Config, all: bool) -> Result<()> {
    let store = CheckpointStore::new(&config.state_dir);
    let registry = TaskRegistry::new(&config.state_dir, config.locks());

    let mut tasks = 0;
    let mut files = 0;
    for task_id in store.task_ids()? {
        let prunable = match registry.get(task_id)?.map(|t| t.status) {
            Some(TaskStatus::Done) => true,
            Some(TaskStatus::Error | TaskStatus::Paused) | None => all,
            Some(TaskStatus::Pending | TaskStatus::Running) => false,
        };
        if !prunable {
            continue;
        }
        let removed = store.prune(task_id)?;
        tracing::debug!(task_id, removed, "pruned checkpoints");
        tasks += 1;
        files += removed;
    }

    println!(
        "{} Pruned {} checkpoint(s) from {} task(s)",
        style("IRIS ▸").cyan().bold(),
        files,
        tasks
    );
    Ok(())
}
