use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{Model, ModelContext};
use crate::errors::{IrisError, IrisResult};

/// Runs an external command per prompt: the prompt goes to stdin, stdout is
/// the response. A non-zero exit or a run longer than `timeout` is a
/// [`IrisError::ModelFailure`].
pub struct CommandModel {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandModel {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    fn failure(&self, message: impl Into<String>) -> IrisError {
        IrisError::ModelFailure {
            model: self.program.clone(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Model for CommandModel {
    async fn generate(&self, prompt: &str, ctx: &ModelContext) -> IrisResult<String> {
        debug!(program = %self.program, task_id = ctx.task_id, phase = %ctx.phase, "spawning model");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env("IRIS_TASK_ID", ctx.task_id.to_string())
            .env("IRIS_PHASE", ctx.phase.as_str())
            .current_dir(&ctx.workspace)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.failure(format!("failed to spawn: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A command that ignores its input may exit before reading it.
            match stdin.write_all(prompt.as_bytes()).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                    debug!(program = %self.program, "model closed stdin early");
                }
                Err(e) => return Err(self.failure(format!("failed to write prompt: {e}"))),
            }
            drop(stdin);
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| self.failure(format!("timed out after {}s", self.timeout.as_secs())))?
            .map_err(|e| self.failure(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.failure(format!(
                "exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(program = %self.program, bytes = text.len(), "model responded");
        Ok(text)
    }

    fn name(&self) -> &str {
        &self.program
    }
}
