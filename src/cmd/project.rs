//! Workspace initialization and task creation: `iris init`, `iris new`.

use anyhow::{Context, Result};
use console::style;

use iris::config::Config;
use iris::context::{ContextStore, CurrentTask};
use iris::init::init_workspace;
use iris::journal::{Journal, JournalEntry};
use iris::task::{Phase, TaskRegistry};

pub fn cmd_init(config: &Config, name: Option<&str>) -> Result<()> {
    let result = init_workspace(config, name)?;

    if result.created {
        println!(
            "{} Created {} and initialized project {}",
            style("IRIS ▸").cyan().bold(),
            iris::init::STATE_DIR,
            style(&result.project_name).bold()
        );
        println!();
        println!("Next steps:");
        println!("  1. Run `iris new \"<goal>\" [--file <path>]...` to create a task");
        println!("  2. Run `iris run <id>` to execute it");
    } else {
        println!(
            "{} Context already initialized at {}",
            style("IRIS ▸").cyan().bold(),
            result.state_dir.display()
        );
    }
    Ok(())
}

pub fn cmd_new(config: &Config, goal: &str, files: &[String]) -> Result<()> {
    if goal.trim().is_empty() {
        anyhow::bail!("Task goal must not be empty");
    }

    let init = init_workspace(config, None)?;
    if init.created {
        println!(
            "{} Created {} and initialized project {}",
            style("IRIS ▸").cyan().bold(),
            iris::init::STATE_DIR,
            style(&init.project_name).bold()
        );
    }

    let locks = config.locks();
    let registry = TaskRegistry::new(&config.state_dir, locks.clone());
    let task = registry
        .create(goal.trim(), files.to_vec())
        .context("Failed to create task")?;

    let store = ContextStore::new(&config.state_dir, locks.clone())
        .with_summary_limit(config.toml.summary.max_chars);
    store.set_current_task(CurrentTask::from_task(&task))?;

    let ctx = store.load()?;
    Journal::new(&config.state_dir, locks).append(
        JournalEntry::new(task.id, Phase::Init, format!("Created task {}: {}", task.id, task.goal)),
        &ctx.meta,
    )?;

    println!(
        "{} Created task {}: {}",
        style("IRIS ▸").cyan().bold(),
        style(task.id).bold(),
        task.goal
    );
    if !task.files.is_empty() {
        println!("  Files: {}", task.files.join(", "));
    }
    Ok(())
}
