//! Task execution: `iris run`.

use anyhow::Result;

use iris::config::Config;
use iris::controller::{PhaseController, RunOutcome};
use iris::errors::IrisError;
use iris::gates::DialoguerGate;
use iris::ui::TerminalRenderer;

pub async fn cmd_run(config: &Config, id: u64, assume_yes: bool) -> Result<()> {
    for warning in config.validate() {
        tracing::warn!("{warning}");
    }

    let controller = PhaseController::from_config(config)
        .with_renderer(TerminalRenderer::new(config.verbose))
        .with_gate(DialoguerGate)
        .assume_yes(assume_yes);

    match controller.run(id).await? {
        RunOutcome::Initialized { .. } | RunOutcome::Done { .. } => Ok(()),
        RunOutcome::Paused { task_id } => Err(IrisError::TaskPaused { id: task_id }.into()),
        RunOutcome::Failed { error, .. } => Err(error.into()),
    }
}
