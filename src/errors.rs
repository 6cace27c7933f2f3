//! Typed error hierarchy for the iris controller.
//!
//! `IrisError` is the domain taxonomy surfaced by the stores and the phase
//! controller. Application plumbing (CLI commands, config loading) uses
//! `anyhow` and wraps these where needed.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors from the stores and the phase controller.
#[derive(Debug, Error)]
pub enum IrisError {
    #[error("Context not initialized at {path}. Run 'iris init' or 'iris new <goal>' first.")]
    NotInitialized { path: PathBuf },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to write {path}: {message}")]
    WriteFailure { path: PathBuf, message: String },

    #[error("Verification failed for {}: {message}", .files.join(", "))]
    VerificationFailure {
        files: Vec<String>,
        message: String,
    },

    #[error("Timed out after {waited:?} waiting for lock '{resource}'")]
    LockTimeout { resource: String, waited: Duration },

    #[error("MUST_READ_FIRST: {file} lines {start}-{end} not covered by a prior read")]
    ReadBeforeWrite {
        file: String,
        start: usize,
        end: usize,
    },

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Path escapes the workspace: {path}")]
    PathOutsideWorkspace { path: String },

    #[error("Task {id} not found")]
    TaskNotFound { id: u64 },

    #[error("No current task in context")]
    NoCurrentTask,

    #[error("Model '{model}' failed: {message}")]
    ModelFailure { model: String, message: String },

    #[error("Task {id} paused: edits were not confirmed. Re-run with --yes to apply them.")]
    TaskPaused { id: u64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl IrisError {
    /// Stable tag printed in front of user-visible failures.
    pub fn tag(&self) -> &'static str {
        match self {
            IrisError::NotInitialized { .. } => "ERR_NOT_INITIALIZED",
            IrisError::FileNotFound { .. } => "ERR_FILE_NOT_FOUND",
            IrisError::WriteFailure { .. } => "ERR_WRITE_FAILED",
            IrisError::VerificationFailure { .. } => "ERR_VERIFICATION_FAILED",
            IrisError::LockTimeout { .. } => "ERR_LOCK_TIMEOUT",
            IrisError::ReadBeforeWrite { .. } => "ERR_ENFORCEMENT_VIOLATION",
            IrisError::InvalidPlan(_) => "ERR_INVALID_PLAN",
            IrisError::PathOutsideWorkspace { .. } => "ERR_ENFORCEMENT_VIOLATION",
            IrisError::TaskNotFound { .. } => "ERR_TASK_NOT_FOUND",
            IrisError::NoCurrentTask => "ERR_NO_CURRENT_TASK",
            IrisError::ModelFailure { .. } => "ERR_MODEL_FAILED",
            IrisError::TaskPaused { .. } => "ERR_TASK_PAUSED",
            IrisError::Io(_) | IrisError::Json(_) => "ERR_EXECUTION_FAILED",
        }
    }

    pub(crate) fn write_failure(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        IrisError::WriteFailure {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

/// Find the tag for an `anyhow` chain, falling back to a generic one.
pub fn tag_of(err: &anyhow::Error) -> &'static str {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<IrisError>())
        .map(IrisError::tag)
        .unwrap_or("ERR_EXECUTION_FAILED")
}

pub type IrisResult<T> = std::result::Result<T, IrisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_timeout_carries_resource_and_wait() {
        let err = IrisError::LockTimeout {
            resource: "state".to_string(),
            waited: Duration::from_millis(250),
        };
        match &err {
            IrisError::LockTimeout { resource, waited } => {
                assert_eq!(resource, "state");
                assert_eq!(*waited, Duration::from_millis(250));
            }
            _ => panic!("Expected LockTimeout"),
        }
        assert_eq!(err.tag(), "ERR_LOCK_TIMEOUT");
    }

    #[test]
    fn verification_failure_lists_files() {
        let err = IrisError::VerificationFailure {
            files: vec!["a.json".into(), "b.toml".into()],
            message: "syntax".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("a.json, b.toml"));
        assert!(msg.contains("syntax"));
    }

    #[test]
    fn io_error_converts_and_is_generic() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: IrisError = io_err.into();
        assert!(matches!(err, IrisError::Io(_)));
        assert_eq!(err.tag(), "ERR_EXECUTION_FAILED");
    }

    #[test]
    fn tag_of_finds_wrapped_domain_error() {
        let err = anyhow::Error::new(IrisError::TaskNotFound { id: 7 }).context("running task");
        assert_eq!(tag_of(&err), "ERR_TASK_NOT_FOUND");

        let plain = anyhow::anyhow!("something else");
        assert_eq!(tag_of(&plain), "ERR_EXECUTION_FAILED");
    }

    #[test]
    fn read_before_write_message_names_range() {
        let err = IrisError::ReadBeforeWrite {
            file: "b.txt".into(),
            start: 1,
            end: 2,
        };
        assert!(err.to_string().contains("b.txt lines 1-2"));
        assert_eq!(err.tag(), "ERR_ENFORCEMENT_VIOLATION");
    }
}
