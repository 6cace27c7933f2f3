//! Persisted context record: project metadata, the single current task with
//! its read state and plan, and the enforcement policy.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{IrisError, IrisResult};
use crate::task::{Phase, Task, TaskStatus};

pub mod store;
pub mod summary;

pub use store::ContextStore;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextProject {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl ContextProject {
    pub fn new(name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_at: now,
            last_updated: now,
        }
    }
}

/// 1-based inclusive line range, stored on disk as `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[usize; 2]", into = "[usize; 2]")]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn is_valid(&self) -> bool {
        self.start >= 1 && self.start <= self.end
    }

    pub fn contains(&self, other: &LineRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn overlaps(&self, other: &LineRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn len(&self) -> usize {
        self.end + 1 - self.start
    }
}

impl From<[usize; 2]> for LineRange {
    fn from(value: [usize; 2]) -> Self {
        Self::new(value[0], value[1])
    }
}

impl From<LineRange> for [usize; 2] {
    fn from(value: LineRange) -> Self {
        [value.start, value.end]
    }
}

impl std::fmt::Display for LineRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// What was read from one file, and the SHA-256 of its bytes at that time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReadStateFile {
    pub lines: LineRange,
    pub hash: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReadState {
    #[serde(default)]
    pub files_read: BTreeMap<String, ReadStateFile>,
}

impl ReadState {
    pub fn record(&mut self, path: &str, lines: LineRange, hash: String) {
        self.files_read
            .insert(path.to_string(), ReadStateFile { lines, hash });
    }

    pub fn get(&self, path: &str) -> Option<&ReadStateFile> {
        self.files_read.get(path)
    }

    pub fn len(&self) -> usize {
        self.files_read.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files_read.is_empty()
    }

    /// Read-before-write: `file` must have been read over a range that covers
    /// `range`.
    pub fn check_covers(&self, file: &str, range: &LineRange) -> IrisResult<()> {
        match self.files_read.get(file) {
            Some(read) if read.lines.contains(range) => Ok(()),
            _ => Err(IrisError::ReadBeforeWrite {
                file: file.to_string(),
                start: range.start,
                end: range.end,
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntendedEdit {
    pub file: String,
    pub range: LineRange,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_content: Option<String>,
}

impl IntendedEdit {
    pub fn new(file: &str, range: LineRange, reason: &str) -> Self {
        Self {
            file: file.to_string(),
            range,
            reason: reason.to_string(),
            original_content: None,
            new_content: None,
        }
    }

    pub fn with_content(mut self, new_content: &str) -> Self {
        self.new_content = Some(new_content.to_string());
        self
    }

    /// Edits without new content are skipped during WRITE.
    pub fn is_applicable(&self) -> bool {
        self.new_content.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    #[serde(default)]
    pub intended_edits: Vec<IntendedEdit>,
    #[serde(default)]
    pub reasoning: String,
}

impl Plan {
    pub fn applicable_edits(&self) -> impl Iterator<Item = &IntendedEdit> {
        self.intended_edits.iter().filter(|e| e.is_applicable())
    }
}

/// Mirror of the running task, plus its per-attempt read state and plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurrentTask {
    pub task_id: u64,
    pub goal: String,
    pub status: TaskStatus,
    pub last_phase: Phase,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub read_state: ReadState,
    #[serde(default)]
    pub plan: Plan,
}

impl CurrentTask {
    /// Fresh attempt for `task`: read state and plan start empty.
    pub fn from_task(task: &Task) -> Self {
        Self {
            task_id: task.id,
            goal: task.goal.clone(),
            status: task.status,
            last_phase: task.phase,
            summary: task.summary.clone(),
            read_state: ReadState::default(),
            plan: Plan::default(),
        }
    }
}

/// Enforcement policy. See [`Policy::requires_confirmation`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Policy {
    #[serde(default = "default_true")]
    pub read_before_write: bool,
    #[serde(default = "default_true")]
    pub unrestricted: bool,
    #[serde(default)]
    pub trusted_workspace: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            read_before_write: true,
            unrestricted: true,
            trusted_workspace: false,
        }
    }
}

impl Policy {
    /// WRITE skips the interactive gate only in an unrestricted workspace that
    /// is trusted, or when the caller passed `--yes`.
    pub fn requires_confirmation(&self, assume_yes: bool) -> bool {
        !(self.unrestricted && (self.trusted_workspace || assume_yes))
    }
}

/// Journal sizing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Meta {
    #[serde(default = "default_journal_max")]
    pub journal_max: usize,
    #[serde(default = "default_compact_after")]
    pub compact_after: usize,
}

fn default_journal_max() -> usize {
    200
}

fn default_compact_after() -> usize {
    50
}

impl Default for Meta {
    fn default() -> Self {
        Self {
            journal_max: default_journal_max(),
            compact_after: default_compact_after(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Context {
    pub project: ContextProject,
    pub current_task: Option<CurrentTask>,
    #[serde(default)]
    pub policy: Policy,
    #[serde(default)]
    pub meta: Meta,
}

impl Context {
    pub fn new(project_name: &str) -> Self {
        Self {
            project: ContextProject::new(project_name),
            current_task: None,
            policy: Policy::default(),
            meta: Meta::default(),
        }
    }

    pub fn current_task_mut(&mut self) -> IrisResult<&mut CurrentTask> {
        self.current_task.as_mut().ok_or(IrisError::NoCurrentTask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_range_serializes_as_pair() {
        let range = LineRange::new(3, 5);
        assert_eq!(serde_json::to_string(&range).unwrap(), "[3,5]");
        let parsed: LineRange = serde_json::from_str("[1,10]").unwrap();
        assert_eq!(parsed, LineRange::new(1, 10));
        assert_eq!(parsed.len(), 10);
    }

    #[test]
    fn test_line_range_contains_and_overlaps() {
        let read = LineRange::new(1, 10);
        assert!(read.contains(&LineRange::new(3, 5)));
        assert!(read.contains(&LineRange::new(1, 10)));
        assert!(!read.contains(&LineRange::new(9, 11)));
        assert!(LineRange::new(2, 4).overlaps(&LineRange::new(4, 6)));
        assert!(!LineRange::new(2, 3).overlaps(&LineRange::new(4, 6)));
        assert!(!LineRange::new(0, 2).is_valid());
        assert!(!LineRange::new(5, 4).is_valid());
    }

    #[test]
    fn test_read_before_write_check() {
        let mut read_state = ReadState::default();
        read_state.record("a.txt", LineRange::new(1, 10), "H".into());

        assert!(read_state.check_covers("a.txt", &LineRange::new(3, 5)).is_ok());

        let missing = read_state.check_covers("b.txt", &LineRange::new(1, 2));
        assert!(matches!(missing, Err(IrisError::ReadBeforeWrite { .. })));

        let beyond = read_state.check_covers("a.txt", &LineRange::new(8, 12));
        assert!(matches!(beyond, Err(IrisError::ReadBeforeWrite { .. })));
    }

    #[test]
    fn test_policy_confirmation_rules() {
        let default = Policy::default();
        assert!(default.requires_confirmation(false));
        assert!(!default.requires_confirmation(true));

        let trusted = Policy {
            trusted_workspace: true,
            ..Policy::default()
        };
        assert!(!trusted.requires_confirmation(false));

        let restricted = Policy {
            unrestricted: false,
            trusted_workspace: true,
            ..Policy::default()
        };
        assert!(restricted.requires_confirmation(true));
    }

    #[test]
    fn test_context_defaults_when_sections_missing() {
        let json = r#"{
            "project": {
                "id": "p1",
                "name": "demo",
                "created_at": "2026-01-23T12:00:00Z",
                "last_updated": "2026-01-23T12:00:00Z"
            },
            "current_task": null
        }"#;
        let ctx: Context = serde_json::from_str(json).unwrap();
        assert_eq!(ctx.meta, Meta::default());
        assert_eq!(ctx.policy, Policy::default());
        assert!(ctx.current_task.is_none());
    }

    #[test]
    fn test_applicable_edits_skip_missing_content() {
        let plan = Plan {
            intended_edits: vec![
                IntendedEdit::new("a.txt", LineRange::new(1, 1), "noop"),
                IntendedEdit::new("a.txt", LineRange::new(2, 2), "real").with_content("x"),
            ],
            reasoning: String::new(),
        };
        let applicable: Vec<_> = plan.applicable_edits().collect();
        assert_eq!(applicable.len(), 1);
        assert_eq!(applicable[0].reason, "real");
    }
}
