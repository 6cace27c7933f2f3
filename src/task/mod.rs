//! Task model: lifecycle status, workflow phase, and the durable registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod registry;

pub use registry::TaskRegistry;

/// Workflow phase. Ordered: a run only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    #[default]
    Init,
    Read,
    Plan,
    Write,
    Verify,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Init,
        Phase::Read,
        Phase::Plan,
        Phase::Write,
        Phase::Verify,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Init => "INIT",
            Phase::Read => "READ",
            Phase::Plan => "PLAN",
            Phase::Write => "WRITE",
            Phase::Verify => "VERIFY",
        }
    }

    /// 1-based position, used for progress display.
    pub fn ordinal(&self) -> usize {
        Phase::ALL.iter().position(|p| p == self).unwrap_or(0) + 1
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "INIT" => Ok(Phase::Init),
            "READ" => Ok(Phase::Read),
            "PLAN" => Ok(Phase::Plan),
            "WRITE" => Ok(Phase::Write),
            "VERIFY" => Ok(Phase::Verify),
            _ => anyhow::bail!(
                "Invalid phase '{}'. Valid values: INIT, READ, PLAN, WRITE, VERIFY",
                s
            ),
        }
    }
}

/// Task lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Paused,
    Done,
    Error,
}

impl TaskStatus {
    /// No further phase will run without a new `iris run`.
    pub fn is_settled(&self) -> bool {
        !matches!(self, TaskStatus::Running)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Paused => write!(f, "paused"),
            TaskStatus::Done => write!(f, "done"),
            TaskStatus::Error => write!(f, "error"),
        }
    }
}

/// A unit of work owned by the [`TaskRegistry`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: u64,
    pub goal: String,
    pub status: TaskStatus,
    pub phase: Phase,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub summary: String,
    /// Files declared at creation. When non-empty they replace discovery.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

impl Task {
    pub fn new(id: u64, goal: &str, files: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            goal: goal.to_string(),
            status: TaskStatus::Pending,
            phase: Phase::Init,
            created_at: now,
            updated_at: now,
            summary: String::new(),
            files,
        }
    }
}
