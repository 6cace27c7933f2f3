//! Workspace layout and `iris init`.
//!
//! ```text
//! .context/
//! ├── context.json     # project + current task + policy
//! ├── journal.json     # append-only event log
//! ├── tasks.json       # task registry (created on first `iris new`)
//! ├── iris.toml        # configuration
//! ├── checkpoints/     # pre-edit snapshots, one directory per task
//! ├── logs/            # optional tracing log file
//! └── *.lock           # advisory lock files
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::checkpoint::CHECKPOINTS_DIR;
use crate::config::{CONFIG_FILE, Config};
use crate::context::ContextStore;

/// Name of the per-workspace state directory.
pub const STATE_DIR: &str = ".context";

#[derive(Debug)]
pub struct InitResult {
    pub state_dir: PathBuf,
    /// `false` when the workspace was already initialized.
    pub created: bool,
    pub project_name: String,
}

pub fn is_initialized(project_dir: &Path) -> bool {
    project_dir.join(STATE_DIR).join("context.json").exists()
}

/// Project name used when none is given: the workspace directory's name.
pub fn default_project_name(project_dir: &Path) -> String {
    project_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "project".to_string())
}

/// Create the state directory, context, journal and default config.
/// Existing state is left untouched.
pub fn init_workspace(config: &Config, name: Option<&str>) -> Result<InitResult> {
    let state_dir = config.state_dir.clone();
    let project_name = name
        .map(str::to_string)
        .unwrap_or_else(|| default_project_name(&config.project_dir));

    for dir in [state_dir.join(CHECKPOINTS_DIR), config.log_dir()] {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }

    let store = ContextStore::new(&state_dir, config.locks());
    let created = store
        .initialize(&project_name)
        .context("Failed to initialize context")?;

    let config_path = state_dir.join(CONFIG_FILE);
    if !config_path.exists() {
        config.toml.save(&config_path)?;
    }

    let project_name = if created {
        project_name
    } else {
        store.load()?.project.name
    };

    Ok(InitResult {
        state_dir,
        created,
        project_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config_for(dir: &Path) -> Config {
        Config::new(dir.to_path_buf(), false).unwrap()
    }

    #[test]
    fn test_init_creates_layout() {
        let dir = tempdir().unwrap();
        assert!(!is_initialized(dir.path()));

        let result = init_workspace(&config_for(dir.path()), Some("demo")).unwrap();
        assert!(result.created);
        assert_eq!(result.project_name, "demo");
        assert!(is_initialized(dir.path()));

        let state = dir.path().join(STATE_DIR);
        assert!(state.join("journal.json").exists());
        assert!(state.join("iris.toml").exists());
        assert!(state.join("checkpoints").is_dir());
        assert!(state.join("logs").is_dir());
    }

    #[test]
    fn test_init_twice_keeps_existing_project() {
        let dir = tempdir().unwrap();
        init_workspace(&config_for(dir.path()), Some("demo")).unwrap();
        let again = init_workspace(&config_for(dir.path()), Some("renamed")).unwrap();
        assert!(!again.created);
        assert_eq!(again.project_name, "demo");
    }

    #[test]
    fn test_default_name_is_directory_name() {
        let dir = tempdir().unwrap();
        let ws = dir.path().join("my-app");
        std::fs::create_dir(&ws).unwrap();
        let result = init_workspace(&config_for(&ws), None).unwrap();
        assert_eq!(result.project_name, "my-app");
    }
}
