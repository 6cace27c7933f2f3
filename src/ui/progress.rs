use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use console::{Term, style};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::icons::{CHECK, CROSS, FILE_MOD, PAUSE, ROLLBACK, SPARKLE};
use super::{Renderer, preview_lines};
use crate::controller::RunOutcome;
use crate::task::Phase;

/// Terminal renderer: a phase bar over a status spinner.
///
/// When stderr is not a terminal the bars are hidden and every line is
/// printed plainly instead.
pub struct TerminalRenderer {
    multi: MultiProgress,
    phase_bar: ProgressBar,
    status_bar: ProgressBar,
    interactive: bool,
    verbose: bool,
    // Serializes preview blocks so their lines are not interleaved.
    print_lock: Mutex<()>,
}

impl TerminalRenderer {
    pub fn new(verbose: bool) -> Self {
        let interactive = Term::stderr().is_term();
        let multi = if interactive {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };

        let phase_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░");
        let phase_bar = multi.add(ProgressBar::new(Phase::ALL.len() as u64));
        phase_bar.set_style(phase_style);
        phase_bar.set_prefix("Phases");

        let status_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let status_bar = multi.add(ProgressBar::new_spinner());
        status_bar.set_style(status_style);
        status_bar.set_prefix("  Task");
        if interactive {
            status_bar.enable_steady_tick(Duration::from_millis(100));
        }

        Self {
            multi,
            phase_bar,
            status_bar,
            interactive,
            verbose,
            print_lock: Mutex::new(()),
        }
    }

    /// Print above the bars, falling back to `eprintln!` when they are hidden
    /// or the terminal rejects the write.
    fn print_line(&self, msg: impl AsRef<str>) {
        if !self.interactive || self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }
}

impl Renderer for TerminalRenderer {
    fn preview(&self, path: &str, original: &str, new: &str) -> Result<()> {
        let _guard = self
            .print_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("preview lock poisoned"))?;
        self.print_line(format!("{}{}", FILE_MOD, style(path).bold()));
        for line in preview_lines(original, new) {
            let styled = if line.starts_with('-') {
                style(line).red()
            } else {
                style(line).green()
            };
            self.print_line(format!("    {styled}"));
        }
        Ok(())
    }

    fn status(&self, phase: Phase, description: &str, progress: f32) -> Result<()> {
        let position = (progress * Phase::ALL.len() as f32).round() as u64;
        self.phase_bar.set_position(position);
        self.phase_bar
            .set_message(format!("{}", style(phase.as_str()).yellow()));
        self.status_bar.set_message(description.to_string());
        if self.verbose || !self.interactive {
            self.print_line(format!(
                "{} {} {}",
                style("IRIS ▸").cyan().bold(),
                style(phase.as_str()).yellow(),
                description
            ));
        }
        Ok(())
    }

    fn finish(&self, outcome: &RunOutcome) -> Result<()> {
        self.status_bar.finish_and_clear();
        match outcome {
            RunOutcome::Initialized { project } => {
                self.phase_bar.finish_and_clear();
                self.print_line(format!(
                    "{}Initialized project {}",
                    SPARKLE,
                    style(project).green().bold()
                ));
            }
            RunOutcome::Done { task_id, files } => {
                self.phase_bar.finish();
                self.print_line(format!(
                    "{}Task {} done ({} file(s) changed)",
                    CHECK,
                    style(task_id).green().bold(),
                    files.len()
                ));
            }
            RunOutcome::Paused { task_id } => {
                self.phase_bar.abandon();
                self.print_line(format!(
                    "{}Task {} paused: edits were not applied",
                    PAUSE,
                    style(task_id).yellow().bold()
                ));
            }
            RunOutcome::Failed {
                task_id,
                phase,
                error,
                rolled_back,
            } => {
                self.phase_bar.abandon();
                self.print_line(format!(
                    "{}Task {} failed in {}: {}",
                    CROSS,
                    style(task_id).red().bold(),
                    style(phase.as_str()).yellow(),
                    error
                ));
                for file in rolled_back {
                    self.print_line(format!("    {}restored {}", ROLLBACK, style(file).dim()));
                }
            }
        }
        Ok(())
    }
}
