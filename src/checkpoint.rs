//! Pre-edit file snapshots.
//!
//! Layout: `<state_dir>/checkpoints/<task_id>/<basename>.orig.<millis>` plus a
//! per-task `manifest.json` listing every capture in order.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::IrisResult;
use crate::util::{write_atomic, write_json_atomic};

pub const CHECKPOINTS_DIR: &str = "checkpoints";
const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub task_id: u64,
    pub file_path: PathBuf,
    pub snapshot_path: PathBuf,
    pub timestamp: DateTime<Utc>,
    /// `false` when the file did not exist at capture time; no snapshot bytes
    /// are written and restoring removes the target.
    pub existed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Manifest {
    #[serde(default)]
    checkpoints: Vec<Checkpoint>,
}

pub struct CheckpointStore {
    root: PathBuf,
}

impl CheckpointStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            root: state_dir.join(CHECKPOINTS_DIR),
        }
    }

    pub fn task_dir(&self, task_id: u64) -> PathBuf {
        self.root.join(task_id.to_string())
    }

    fn manifest_path(&self, task_id: u64) -> PathBuf {
        self.task_dir(task_id).join(MANIFEST_FILE)
    }

    fn read_manifest(&self, task_id: u64) -> IrisResult<Manifest> {
        match fs::read_to_string(self.manifest_path(task_id)) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Manifest::default()),
            Err(err) => Err(err.into()),
        }
    }

    fn snapshot_path(&self, task_id: u64, file_path: &Path, timestamp: DateTime<Utc>) -> PathBuf {
        let base = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let stem = format!("{base}.orig.{}", timestamp.timestamp_millis());
        let dir = self.task_dir(task_id);

        let mut candidate = dir.join(&stem);
        let mut n = 1;
        while candidate.exists() {
            candidate = dir.join(format!("{stem}.{n}"));
            n += 1;
        }
        candidate
    }

    /// Snapshot `file_path` as it is right now.
    pub fn capture(&self, task_id: u64, file_path: &Path) -> IrisResult<Checkpoint> {
        let dir = self.task_dir(task_id);
        fs::create_dir_all(&dir)?;

        let timestamp = Utc::now();
        let snapshot_path = self.snapshot_path(task_id, file_path, timestamp);
        let existed = match fs::read(file_path) {
            Ok(bytes) => {
                write_atomic(&snapshot_path, &bytes)?;
                true
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => false,
            Err(err) => return Err(err.into()),
        };

        let checkpoint = Checkpoint {
            task_id,
            file_path: file_path.to_path_buf(),
            snapshot_path,
            timestamp,
            existed,
        };

        let mut manifest = self.read_manifest(task_id)?;
        manifest.checkpoints.push(checkpoint.clone());
        write_json_atomic(&self.manifest_path(task_id), &manifest)?;

        debug!(
            task_id,
            file = %file_path.display(),
            snapshot = %checkpoint.snapshot_path.display(),
            existed,
            "checkpoint captured"
        );
        Ok(checkpoint)
    }

    /// Put `target` back to the captured state.
    pub fn restore(&self, checkpoint: &Checkpoint, target: &Path) -> IrisResult<()> {
        if checkpoint.existed {
            let bytes = fs::read(&checkpoint.snapshot_path)?;
            write_atomic(target, &bytes)?;
        } else {
            match fs::remove_file(target) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        debug!(task_id = checkpoint.task_id, target = %target.display(), "checkpoint restored");
        Ok(())
    }

    /// All captures for a task, oldest first.
    pub fn list(&self, task_id: u64) -> IrisResult<Vec<Checkpoint>> {
        Ok(self.read_manifest(task_id)?.checkpoints)
    }

    pub fn latest_for(&self, task_id: u64, file_path: &Path) -> IrisResult<Option<Checkpoint>> {
        Ok(self
            .list(task_id)?
            .into_iter()
            .rev()
            .find(|c| c.file_path == file_path))
    }

    /// Delete every checkpoint of a task. Returns how many were removed.
    pub fn prune(&self, task_id: u64) -> IrisResult<usize> {
        let count = self.list(task_id)?.len();
        let dir = self.task_dir(task_id);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        }
        debug!(task_id, count, "checkpoints pruned");
        Ok(count)
    }

    /// Task ids that currently have a checkpoint directory.
    pub fn task_ids(&self) -> IrisResult<Vec<u64>> {
        let read_dir = match fs::read_dir(&self.root) {
            Ok(rd) => rd,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut ids: Vec<u64> = read_dir
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().to_str()?.parse().ok())
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_capture_and_restore_round_trip() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(&dir.path().join(".context"));
        let file = dir.path().join("a.txt");
        fs::write(&file, b"line1\nline2\n").unwrap();

        let cp = store.capture(1, &file).unwrap();
        assert!(cp.existed);
        assert!(cp.snapshot_path.starts_with(store.task_dir(1)));
        assert!(
            cp.snapshot_path
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("a.txt.orig.")
        );

        fs::write(&file, b"clobbered").unwrap();
        store.restore(&cp, &file).unwrap();
        assert_eq!(fs::read(&file).unwrap(), b"line1\nline2\n");
    }

    #[test]
    fn test_empty_file_round_trip() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let file = dir.path().join("empty.txt");
        fs::write(&file, b"").unwrap();

        let cp = store.capture(3, &file).unwrap();
        fs::write(&file, b"now has content").unwrap();
        store.restore(&cp, &file).unwrap();
        assert_eq!(fs::read(&file).unwrap(), b"");
    }

    #[test]
    fn test_nonexistent_file_restore_removes_target() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let file = dir.path().join("new.txt");

        let cp = store.capture(2, &file).unwrap();
        assert!(!cp.existed);
        assert!(!cp.snapshot_path.exists());

        fs::write(&file, b"created by edit").unwrap();
        store.restore(&cp, &file).unwrap();
        assert!(!file.exists());
        // Restoring again is harmless.
        store.restore(&cp, &file).unwrap();
    }

    #[test]
    fn test_collision_gets_suffix_and_latest_wins() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let file = dir.path().join("a.txt");

        fs::write(&file, b"v1").unwrap();
        let first = store.capture(1, &file).unwrap();
        fs::write(&file, b"v2").unwrap();
        let second = store.capture(1, &file).unwrap();
        assert_ne!(first.snapshot_path, second.snapshot_path);

        let latest = store.latest_for(1, &file).unwrap().unwrap();
        assert_eq!(latest, second);
        assert_eq!(fs::read(&latest.snapshot_path).unwrap(), b"v2");
        assert_eq!(store.list(1).unwrap().len(), 2);
    }

    #[test]
    fn test_prune_removes_task_dir() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let file = dir.path().join("a.txt");
        fs::write(&file, b"x").unwrap();
        store.capture(4, &file).unwrap();
        store.capture(5, &file).unwrap();

        assert_eq!(store.task_ids().unwrap(), vec![4, 5]);
        assert_eq!(store.prune(4).unwrap(), 1);
        assert_eq!(store.prune(4).unwrap(), 0);
        assert_eq!(store.task_ids().unwrap(), vec![5]);
        assert!(store.latest_for(4, &file).unwrap().is_none());
    }
}
