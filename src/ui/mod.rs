//! Presentation seam for the phase controller.
//!
//! The controller reports through a [`Renderer`]; every error a renderer
//! returns is logged and otherwise ignored, so display problems never change
//! the outcome of a run.

use anyhow::Result;

use crate::controller::RunOutcome;
use crate::task::Phase;

pub mod icons;
pub mod progress;

pub use progress::TerminalRenderer;

pub trait Renderer: Send + Sync {
    /// Show a proposed change to `path` before confirmation.
    fn preview(&self, path: &str, original: &str, new: &str) -> Result<()>;

    /// A phase finished; `progress` is the fraction of the workflow done.
    fn status(&self, phase: Phase, description: &str, progress: f32) -> Result<()>;

    fn finish(&self, outcome: &RunOutcome) -> Result<()>;
}

/// Renders nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn preview(&self, _path: &str, _original: &str, _new: &str) -> Result<()> {
        Ok(())
    }

    fn status(&self, _phase: Phase, _description: &str, _progress: f32) -> Result<()> {
        Ok(())
    }

    fn finish(&self, _outcome: &RunOutcome) -> Result<()> {
        Ok(())
    }
}

/// Workflow fraction reached once `phase` has completed.
pub fn phase_progress(phase: Phase) -> f32 {
    phase.ordinal() as f32 / Phase::ALL.len() as f32
}

/// Line-oriented preview: removed lines then added lines.
pub fn preview_lines(original: &str, new: &str) -> Vec<String> {
    let mut lines: Vec<String> = original.split('\n').map(|l| format!("-{l}")).collect();
    lines.extend(new.split('\n').map(|l| format!("+{l}")));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_progress() {
        assert_eq!(phase_progress(Phase::Init), 0.2);
        assert_eq!(phase_progress(Phase::Verify), 1.0);
    }

    #[test]
    fn test_preview_lines() {
        assert_eq!(
            preview_lines("line2\nline3", "X\nY"),
            vec!["-line2", "-line3", "+X", "+Y"]
        );
    }
}
