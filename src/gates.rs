//! Confirmation before WRITE touches any file.

use anyhow::Result;
use console::{Term, style};
use dialoguer::{Select, theme::ColorfulTheme};
use tracing::warn;

use crate::context::Plan;

pub trait ApprovalGate: Send + Sync {
    /// `Ok(false)` declines the plan and pauses the task.
    fn confirm_write(&self, plan: &Plan) -> Result<bool>;
}

/// Interactive prompt on the terminal. Declines when there is no terminal to
/// ask on.
#[derive(Debug, Default, Clone, Copy)]
pub struct DialoguerGate;

impl ApprovalGate for DialoguerGate {
    fn confirm_write(&self, plan: &Plan) -> Result<bool> {
        if !Term::stderr().is_term() {
            warn!("no terminal for confirmation; declining (pass --yes to apply)");
            return Ok(false);
        }

        let edits = plan.applicable_edits().count();
        if !plan.reasoning.is_empty() {
            eprintln!("  {} {}", style("Reasoning:").dim(), plan.reasoning);
        }

        let options = &["Yes, apply the edits", "No, pause the task"];
        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Apply {edits} edit(s)?"))
            .items(options)
            .default(0)
            .interact()?;

        Ok(selection == 0)
    }
}

/// Approves everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoApprove;

impl ApprovalGate for AutoApprove {
    fn confirm_write(&self, _plan: &Plan) -> Result<bool> {
        Ok(true)
    }
}
