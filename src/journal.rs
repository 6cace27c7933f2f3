//! Append-only event log for task runs, stored as `journal.json`.
//!
//! Once the log grows past `compact_after` entries, the oldest ones are folded
//! into a single synthetic INIT entry so the file stays bounded.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::context::Meta;
use crate::errors::IrisResult;
use crate::lock::{LockManager, STATE_LOCK};
use crate::task::Phase;
use crate::util::{truncate_chars, write_json_atomic};

pub const JOURNAL_FILE: &str = "journal.json";

/// Collapsed entries quoted in a compaction summary.
const SUMMARY_ENTRIES: usize = 10;
/// Per-entry description limit inside a compaction summary.
const SUMMARY_DESC_CHARS: usize = 80;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JournalEntry {
    pub ts: DateTime<Utc>,
    pub task_id: u64,
    pub phase: Phase,
    pub desc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl JournalEntry {
    pub fn new(task_id: u64, phase: Phase, desc: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            task_id,
            phase,
            desc: desc.into(),
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn is_compacted(&self) -> bool {
        self.meta
            .as_ref()
            .and_then(|m| m.get("compacted"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JournalFile {
    #[serde(default)]
    pub entries: Vec<JournalEntry>,
}

/// Fold the oldest entries into one summary entry when `entries` is over the
/// threshold. Returns how many entries were collapsed (0 when untouched).
pub fn compact(entries: &mut Vec<JournalEntry>, meta: &Meta) -> usize {
    if entries.len() <= meta.compact_after {
        return 0;
    }
    let retain = meta.journal_max.min(entries.len() - meta.compact_after);
    let collapse = entries.len() - retain;
    if collapse == 0 {
        return 0;
    }

    let collapsed: Vec<JournalEntry> = entries.drain(..collapse).collect();
    let oldest_task_id = collapsed[0].task_id;
    let actions = collapsed
        .iter()
        .take(SUMMARY_ENTRIES)
        .map(|e| format!("{}: {}", e.phase, truncate_chars(&e.desc, SUMMARY_DESC_CHARS)))
        .collect::<Vec<_>>()
        .join(", ");

    let summary = JournalEntry::new(
        oldest_task_id,
        Phase::Init,
        format!(
            "Compacted {} entries: Historical actions: {}",
            collapsed.len(),
            actions
        ),
    )
    .with_meta(json!({
        "compacted": true,
        "entry_count": collapsed.len(),
        "oldest_task_id": oldest_task_id,
    }));

    entries.insert(0, summary);
    collapse
}

pub struct Journal {
    path: PathBuf,
    locks: LockManager,
}

impl Journal {
    pub fn new(state_dir: &Path, locks: LockManager) -> Self {
        Self {
            path: state_dir.join(JOURNAL_FILE),
            locks,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self) -> IrisResult<JournalFile> {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(JournalFile::default()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(JournalFile::default()),
            Err(err) => Err(err.into()),
        }
    }

    /// Append `entry`, compacting if needed. The `state` lock is held across
    /// load, push, compact and write.
    pub fn append(&self, entry: JournalEntry, meta: &Meta) -> IrisResult<()> {
        let _guard = self.locks.acquire(STATE_LOCK)?;
        let mut file = self.read_file()?;
        debug!(task_id = entry.task_id, phase = %entry.phase, "journal append");
        file.entries.push(entry);
        let collapsed = compact(&mut file.entries, meta);
        if collapsed > 0 {
            debug!(collapsed, retained = file.entries.len() - 1, "journal compacted");
        }
        write_json_atomic(&self.path, &file)
    }

    pub fn load(&self) -> IrisResult<Vec<JournalEntry>> {
        Ok(self.read_file()?.entries)
    }

    pub fn entries_for(&self, task_id: u64) -> IrisResult<Vec<JournalEntry>> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|e| e.task_id == task_id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::LockSettings;
    use tempfile::tempdir;

    fn entries(n: usize) -> Vec<JournalEntry> {
        (0..n)
            .map(|i| JournalEntry::new(i as u64 + 1, Phase::Read, format!("entry {i}")))
            .collect()
    }

    fn meta(journal_max: usize, compact_after: usize) -> Meta {
        Meta {
            journal_max,
            compact_after,
        }
    }

    #[test]
    fn test_compact_below_threshold_is_noop() {
        let mut log = entries(50);
        assert_eq!(compact(&mut log, &Meta::default()), 0);
        assert_eq!(log.len(), 50);
        assert!(!log[0].is_compacted());
    }

    #[test]
    fn test_compact_retains_recent_entries() {
        let mut log = entries(60);
        let collapsed = compact(&mut log, &meta(200, 50));
        // retain = min(200, 60 - 50) = 10
        assert_eq!(collapsed, 50);
        assert_eq!(log.len(), 11);
        assert!(log[0].is_compacted());
        assert_eq!(log[0].phase, Phase::Init);
        assert_eq!(log[0].task_id, 1);
        assert_eq!(log[1].desc, "entry 50");
        assert_eq!(log[10].desc, "entry 59");

        let summary_meta = log[0].meta.as_ref().unwrap();
        assert_eq!(summary_meta["entry_count"], 50);
        assert_eq!(summary_meta["oldest_task_id"], 1);
        assert!(log[0].desc.starts_with("Compacted 50 entries: Historical actions: READ: entry 0"));
        assert!(log[0].desc.contains("READ: entry 9"));
        assert!(!log[0].desc.contains("entry 10"));
    }

    #[test]
    fn test_compact_respects_journal_max() {
        let mut log = entries(30);
        compact(&mut log, &meta(5, 10));
        // retain = min(5, 30 - 10) = 5
        assert_eq!(log.len(), 6);
    }

    #[test]
    fn test_recompact_below_threshold_is_noop() {
        let mut log = entries(60);
        compact(&mut log, &meta(200, 50));
        let snapshot = log.clone();
        assert_eq!(compact(&mut log, &meta(200, 50)), 0);
        assert_eq!(log, snapshot);
    }

    #[test]
    fn test_compact_truncates_long_descriptions() {
        let mut log = vec![JournalEntry::new(7, Phase::Plan, "x".repeat(200))];
        log.extend(entries(3));
        compact(&mut log, &meta(1, 1));
        assert!(log[0].desc.contains(&format!("PLAN: {}...", "x".repeat(77))));
        assert!(!log[0].desc.contains(&"x".repeat(81)));
        assert_eq!(log[0].task_id, 7);
    }

    #[test]
    fn test_append_and_filter_by_task() {
        let dir = tempdir().unwrap();
        let journal = Journal::new(dir.path(), LockManager::new(dir.path(), LockSettings::default()));
        let meta = Meta::default();
        journal.append(JournalEntry::new(1, Phase::Read, "Read 1 file"), &meta).unwrap();
        journal.append(JournalEntry::new(2, Phase::Read, "Read 3 files"), &meta).unwrap();
        journal
            .append(
                JournalEntry::new(1, Phase::Plan, "Planned edit").with_meta(json!({"file": "a.txt"})),
                &meta,
            )
            .unwrap();

        assert_eq!(journal.load().unwrap().len(), 3);
        let mine = journal.entries_for(1).unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[1].meta.as_ref().unwrap()["file"], "a.txt");
    }

    #[test]
    fn test_append_compacts_on_disk() {
        let dir = tempdir().unwrap();
        let journal = Journal::new(dir.path(), LockManager::new(dir.path(), LockSettings::default()));
        let meta = meta(3, 4);
        for i in 0..6 {
            journal
                .append(JournalEntry::new(1, Phase::Write, format!("step {i}")), &meta)
                .unwrap();
        }
        let log = journal.load().unwrap();
        assert!(log[0].is_compacted());
        assert_eq!(log.last().unwrap().desc, "step 5");
        assert!(log.len() <= 5);
    }
}
