//! Plan checks that run before WRITE may touch anything.

use std::collections::BTreeMap;
use std::path::Path;

use super::splice;
use crate::context::{Plan, Policy, ReadState};
use crate::discovery::workspace_key;
use crate::errors::{IrisError, IrisResult};

/// Validate `plan` and normalize it in place: file paths become workspace
/// keys and `original_content` is filled from what READ saw.
///
/// Fails on the first malformed range, read-before-write violation, path
/// outside the workspace, or overlap between two edits of the same file.
pub fn validate_plan(
    plan: &mut Plan,
    root: &Path,
    read_state: &ReadState,
    contents: &BTreeMap<String, String>,
    policy: &Policy,
) -> IrisResult<()> {
    for edit in plan.intended_edits.iter_mut() {
        if !edit.range.is_valid() {
            return Err(IrisError::InvalidPlan(format!(
                "edit to {} has invalid range {}",
                edit.file, edit.range
            )));
        }
        edit.file = workspace_key(root, &edit.file)?;
        if policy.read_before_write {
            read_state.check_covers(&edit.file, &edit.range)?;
        }
        if let Some(content) = contents.get(&edit.file) {
            edit.original_content = splice::extract(content, &edit.range);
        }
    }

    // Edits without content are never applied, so they cannot conflict.
    let mut by_file: BTreeMap<&str, Vec<_>> = BTreeMap::new();
    for edit in plan.intended_edits.iter().filter(|e| e.is_applicable()) {
        by_file.entry(edit.file.as_str()).or_default().push(edit.range);
    }
    for (file, mut ranges) in by_file {
        ranges.sort_by_key(|r| r.start);
        for pair in ranges.windows(2) {
            if pair[0].overlaps(&pair[1]) {
                return Err(IrisError::InvalidPlan(format!(
                    "overlapping edits in {file}: lines {} and {}",
                    pair[0], pair[1]
                )));
            }
        }
    }
    Ok(())
}
