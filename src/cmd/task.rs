//! Read-only task views: `iris list`, `iris status`, `iris attach`, `iris logs`.

use std::time::Duration;

use anyhow::Result;
use console::style;

use iris::config::Config;
use iris::context::{ContextStore, CurrentTask};
use iris::errors::IrisError;
use iris::journal::{Journal, JournalEntry};
use iris::task::{Task, TaskRegistry, TaskStatus};

const RECENT_ENTRIES: usize = 5;
const FOLLOW_INTERVAL: Duration = Duration::from_millis(500);

fn require_initialized(config: &Config) -> Result<ContextStore> {
    let store = ContextStore::new(&config.state_dir, config.locks());
    if !store.is_initialized() {
        return Err(IrisError::NotInitialized {
            path: config.state_dir.clone(),
        }
        .into());
    }
    Ok(store)
}

fn styled_status(status: TaskStatus) -> String {
    let label = format!("[{}]", status.to_string().to_uppercase());
    match status {
        TaskStatus::Done => style(label).green().to_string(),
        TaskStatus::Error => style(label).red().to_string(),
        TaskStatus::Paused => style(label).yellow().to_string(),
        TaskStatus::Running => style(label).cyan().to_string(),
        TaskStatus::Pending => style(label).dim().to_string(),
    }
}

fn print_summary(summary: &str) {
    if summary.is_empty() {
        return;
    }
    println!("  Summary:");
    for line in textwrap::wrap(summary, 76) {
        println!("    {line}");
    }
}

fn print_entry(entry: &JournalEntry) {
    println!(
        "  {} [{}] {}",
        entry.ts.format("%Y-%m-%d %H:%M:%S"),
        style(entry.phase).yellow(),
        entry.desc
    );
}

pub fn cmd_list(config: &Config) -> Result<()> {
    let store = require_initialized(config)?;
    let current = store.load()?.current_task.map(|t| t.task_id);
    let tasks = TaskRegistry::new(&config.state_dir, config.locks()).list()?;

    if tasks.is_empty() {
        println!("No tasks. Run 'iris new \"<goal>\"' to create one.");
        return Ok(());
    }

    println!();
    println!("{:<3} {:<6} {:<10} {:<8} Goal", "", "ID", "Status", "Phase");
    println!("{:<3} {:<6} {:<10} {:<8} ----", "", "------", "----------", "--------");
    for task in &tasks {
        let marker = if current == Some(task.id) { "*" } else { "" };
        println!(
            "{:<3} {:<6} {:<10} {:<8} {}",
            marker,
            task.id,
            task.status.to_string(),
            task.phase.as_str(),
            task.goal
        );
    }
    println!();
    Ok(())
}

fn print_current(current: &CurrentTask) {
    println!(
        "  {} {}: {}",
        styled_status(current.status),
        current.task_id,
        current.goal
    );
    println!("  Phase: {}", current.last_phase);
    println!("  Files read: {}", current.read_state.len());
    println!("  Planned edits: {}", current.plan.intended_edits.len());
    print_summary(&current.summary);
}

pub fn cmd_status(config: &Config) -> Result<()> {
    let store = require_initialized(config)?;
    let ctx = store.load()?;

    println!();
    println!("Project: {} ({})", style(&ctx.project.name).bold(), ctx.project.id);
    println!(
        "Policy: read_before_write={} unrestricted={} trusted_workspace={}",
        ctx.policy.read_before_write, ctx.policy.unrestricted, ctx.policy.trusted_workspace
    );
    println!();
    match &ctx.current_task {
        Some(current) => {
            println!("Current task:");
            print_current(current);
        }
        None => println!("No current task."),
    }
    println!();
    Ok(())
}

fn print_task(task: &Task) {
    println!(
        "{} {} {}",
        style("IRIS ▸ ATTACHED ▸").cyan().bold(),
        styled_status(task.status),
        task.goal
    );
    println!("  Phase: {}", task.phase);
    if !task.files.is_empty() {
        println!("  Files: {}", task.files.join(", "));
    }
    print_summary(&task.summary);
}

/// Show a task and its latest journal activity. With `follow`, keep printing
/// new entries until the task is no longer running.
pub async fn cmd_attach(config: &Config, id: u64, follow: bool) -> Result<()> {
    require_initialized(config)?;
    let registry = TaskRegistry::new(&config.state_dir, config.locks());
    let journal = Journal::new(&config.state_dir, config.locks());

    let task = registry.require(id)?;
    print_task(&task);

    let entries = journal.entries_for(id)?;
    if !entries.is_empty() {
        println!();
        println!("Recent activity:");
        for entry in entries.iter().rev().take(RECENT_ENTRIES).rev() {
            print_entry(entry);
        }
    }

    if !follow {
        return Ok(());
    }

    let mut seen = entries.len();
    let mut status = task.status;
    while !status.is_settled() {
        tokio::time::sleep(FOLLOW_INTERVAL).await;
        let entries = journal.entries_for(id)?;
        for entry in entries.iter().skip(seen) {
            print_entry(entry);
        }
        seen = entries.len();
        status = registry.require(id)?.status;
    }
    println!("  Task {id} is {status}.");
    Ok(())
}

pub fn cmd_logs(config: &Config, id: u64) -> Result<()> {
    require_initialized(config)?;
    let entries = Journal::new(&config.state_dir, config.locks()).entries_for(id)?;

    if entries.is_empty() {
        println!("No logs found for task {id}");
        return Ok(());
    }

    println!("Task {id} execution logs:");
    println!();
    for entry in &entries {
        println!(
            "[{}] {}",
            style(entry.phase).yellow(),
            entry.ts.format("%Y-%m-%dT%H:%M:%S")
        );
        println!("  {}", entry.desc);
        if let Some(meta) = &entry.meta {
            println!("  {}", style(format!("Meta: {meta}")).dim());
        }
        println!();
    }
    Ok(())
}
