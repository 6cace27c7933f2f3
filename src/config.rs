//! Configuration for iris, read from `.context/iris.toml`.
//!
//! Settings are layered file → environment → CLI. Every key is optional; a
//! missing file yields the defaults shown here:
//!
//! ```toml
//! [lock]
//! timeout_ms = 10000
//! poll_ms = 25
//!
//! [discovery]
//! max_files = 10
//! extensions = ["rs", "py", "js", "ts", "go", "json", "toml", "yaml", "yml", "md", "txt"]
//! exclude_dirs = ["node_modules", "__pycache__", "target", "vendor", "dist"]
//!
//! [summary]
//! max_chars = 800
//!
//! [model]
//! command = "my-model-cli"   # unset: built-in static model
//! args = ["--json"]
//! timeout_secs = 300
//!
//! [verify]
//! python = "python3"
//!
//! [logging]
//! file = false
//! ```
//!
//! Environment overrides: `IRIS_MODEL_CMD` (whitespace-separated command and
//! arguments) and `IRIS_LOCK_TIMEOUT_MS`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::init::STATE_DIR;
use crate::lock::{LockManager, LockSettings};

pub const CONFIG_FILE: &str = "iris.toml";
pub const ENV_MODEL_CMD: &str = "IRIS_MODEL_CMD";
pub const ENV_LOCK_TIMEOUT_MS: &str = "IRIS_LOCK_TIMEOUT_MS";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LockSection {
    #[serde(default = "default_lock_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
}

fn default_lock_timeout_ms() -> u64 {
    10_000
}

fn default_poll_ms() -> u64 {
    25
}

impl Default for LockSection {
    fn default() -> Self {
        Self {
            timeout_ms: default_lock_timeout_ms(),
            poll_ms: default_poll_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoverySection {
    /// Upper bound on files read when a task declares none.
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    /// Extensions (without the dot) considered source files.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Directory names never descended into. Hidden directories are always skipped.
    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,
}

fn default_max_files() -> usize {
    10
}

fn default_extensions() -> Vec<String> {
    [
        "rs", "py", "js", "ts", "go", "json", "toml", "yaml", "yml", "md", "txt",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_exclude_dirs() -> Vec<String> {
    ["node_modules", "__pycache__", "target", "vendor", "dist"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            extensions: default_extensions(),
            exclude_dirs: default_exclude_dirs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummarySection {
    #[serde(default = "default_summary_chars")]
    pub max_chars: usize,
}

fn default_summary_chars() -> usize {
    crate::context::summary::DEFAULT_MAX_CHARS
}

impl Default for SummarySection {
    fn default() -> Self {
        Self {
            max_chars: default_summary_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
}

fn default_model_timeout() -> u64 {
    300
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            timeout_secs: default_model_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerifySection {
    #[serde(default = "default_python")]
    pub python: String,
}

fn default_python() -> String {
    "python3".to_string()
}

impl Default for VerifySection {
    fn default() -> Self {
        Self {
            python: default_python(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LoggingSection {
    /// Also write logs to `.context/logs/iris.log`.
    #[serde(default)]
    pub file: bool,
}

/// The complete `iris.toml` structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IrisToml {
    #[serde(default)]
    pub lock: LockSection,
    #[serde(default)]
    pub discovery: DiscoverySection,
    #[serde(default)]
    pub summary: SummarySection,
    #[serde(default)]
    pub model: ModelSection,
    #[serde(default)]
    pub verify: VerifySection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl IrisToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse iris.toml")
    }

    /// Defaults when `state_dir/iris.toml` does not exist.
    pub fn load_or_default(state_dir: &Path) -> Result<Self> {
        let path = state_dir.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize iris.toml")?;
        crate::util::write_atomic(path, content.as_bytes())
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Warnings for values that are legal TOML but unusable.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.lock.poll_ms == 0 {
            warnings.push("lock.poll_ms is 0; using 1ms".to_string());
        }
        if self.discovery.max_files == 0 {
            warnings.push("discovery.max_files is 0; READ will find no files".to_string());
        }
        if self.summary.max_chars == 0 {
            warnings.push("summary.max_chars is 0; summaries will be empty".to_string());
        }
        if matches!(self.model.command.as_deref(), Some(c) if c.trim().is_empty()) {
            warnings.push("model.command is empty; using the static model".to_string());
        }
        warnings
    }
}

/// Resolve the model command line: env value (split on whitespace) wins over
/// the file's `command` + `args`. `None` means the static model.
pub fn resolve_model_command(
    section: &ModelSection,
    env_value: Option<String>,
) -> Option<(String, Vec<String>)> {
    if let Some(value) = env_value {
        let mut parts = value.split_whitespace().map(str::to_string);
        if let Some(program) = parts.next() {
            return Some((program, parts.collect()));
        }
    }
    section
        .command
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(|c| (c.to_string(), section.args.clone()))
}

pub fn resolve_lock_settings(section: &LockSection, env_value: Option<String>) -> LockSettings {
    let timeout_ms = env_value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(section.timeout_ms);
    LockSettings {
        timeout: Duration::from_millis(timeout_ms),
        poll_interval: Duration::from_millis(section.poll_ms.max(1)),
    }
}

/// Runtime configuration for one workspace.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub state_dir: PathBuf,
    pub toml: IrisToml,
    pub verbose: bool,
}

impl Config {
    pub fn new(project_dir: PathBuf, verbose: bool) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let state_dir = project_dir.join(STATE_DIR);
        let toml = IrisToml::load_or_default(&state_dir)?;
        Ok(Self {
            project_dir,
            state_dir,
            toml,
            verbose,
        })
    }

    pub fn config_file(&self) -> PathBuf {
        self.state_dir.join(CONFIG_FILE)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.state_dir.join("logs")
    }

    /// Lock settings (env → file → default).
    pub fn lock_settings(&self) -> LockSettings {
        resolve_lock_settings(&self.toml.lock, std::env::var(ENV_LOCK_TIMEOUT_MS).ok())
    }

    pub fn locks(&self) -> LockManager {
        LockManager::new(&self.state_dir, self.lock_settings())
    }

    /// Model command line (env → file), `None` for the static model.
    pub fn model_command(&self) -> Option<(String, Vec<String>)> {
        resolve_model_command(&self.toml.model, std::env::var(ENV_MODEL_CMD).ok())
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.toml.model.timeout_secs)
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_from_empty_file() {
        let cfg = IrisToml::parse("").unwrap();
        assert_eq!(cfg, IrisToml::default());
        assert_eq!(cfg.lock.timeout_ms, 10_000);
        assert_eq!(cfg.discovery.max_files, 10);
        assert!(cfg.discovery.exclude_dirs.contains(&"node_modules".to_string()));
        assert_eq!(cfg.summary.max_chars, 800);
        assert_eq!(cfg.model.timeout_secs, 300);
        assert_eq!(cfg.verify.python, "python3");
        assert!(!cfg.logging.file);
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let cfg = IrisToml::parse(
            r#"
[lock]
timeout_ms = 500

[model]
command = "my-model"
args = ["--json"]
"#,
        )
        .unwrap();
        assert_eq!(cfg.lock.timeout_ms, 500);
        assert_eq!(cfg.lock.poll_ms, 25);
        assert_eq!(cfg.model.command.as_deref(), Some("my-model"));
        assert_eq!(cfg.model.timeout_secs, 300);
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let err = IrisToml::parse("[lock\ntimeout_ms = ").unwrap_err();
        assert!(err.to_string().contains("Failed to parse iris.toml"));
    }

    #[test]
    fn test_save_then_load_or_default() {
        let dir = tempdir().unwrap();
        assert_eq!(IrisToml::load_or_default(dir.path()).unwrap(), IrisToml::default());

        let mut cfg = IrisToml::default();
        cfg.summary.max_chars = 120;
        cfg.save(&dir.path().join(CONFIG_FILE)).unwrap();
        let loaded = IrisToml::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded.summary.max_chars, 120);
    }

    #[test]
    fn test_model_command_resolution() {
        let mut section = ModelSection::default();
        assert_eq!(resolve_model_command(&section, None), None);

        section.command = Some("model-cli".into());
        section.args = vec!["--json".into()];
        assert_eq!(
            resolve_model_command(&section, None),
            Some(("model-cli".to_string(), vec!["--json".to_string()]))
        );

        assert_eq!(
            resolve_model_command(&section, Some("sh -c cat".into())),
            Some(("sh".to_string(), vec!["-c".to_string(), "cat".to_string()]))
        );

        // A blank env value falls through to the file.
        assert_eq!(
            resolve_model_command(&section, Some("  ".into())).map(|(c, _)| c),
            Some("model-cli".to_string())
        );
    }

    #[test]
    fn test_lock_settings_env_override() {
        let section = LockSection::default();
        let settings = resolve_lock_settings(&section, Some("250".into()));
        assert_eq!(settings.timeout, Duration::from_millis(250));
        assert_eq!(settings.poll_interval, Duration::from_millis(25));

        let settings = resolve_lock_settings(&section, Some("soon".into()));
        assert_eq!(settings.timeout, Duration::from_millis(10_000));
    }

    #[test]
    fn test_validate_warnings() {
        let mut cfg = IrisToml::default();
        assert!(cfg.validate().is_empty());
        cfg.discovery.max_files = 0;
        cfg.model.command = Some(" ".into());
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn test_config_paths_under_state_dir() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(STATE_DIR)).unwrap();
        let config = Config::new(dir.path().to_path_buf(), false).unwrap();
        let root = dir.path().canonicalize().unwrap();
        assert_eq!(config.state_dir, root.join(".context"));
        assert_eq!(config.config_file(), root.join(".context/iris.toml"));
        assert_eq!(config.log_dir(), root.join(".context/logs"));
    }
}
