//! Model collaborators and the planning seam.
//!
//! A [`Model`] turns a prompt into text. A [`Planner`] turns a goal plus the
//! files read during READ into a structured [`Plan`](crate::context::Plan);
//! [`ModelPlanner`] does this by prompting a model for JSON.
//!
//! Implementations:
//! - [`CommandModel`]: spawns a configured command, prompt on stdin
//! - [`StaticModel`]: fixed response, used when no command is configured

use std::path::PathBuf;

use async_trait::async_trait;

use crate::errors::IrisResult;
use crate::task::Phase;

pub mod command;
pub mod planner;

pub use command::CommandModel;
pub use planner::{ModelPlanner, PlanRequest, Planner, ReadFile};

/// What the model is being asked about.
#[derive(Debug, Clone)]
pub struct ModelContext {
    pub task_id: u64,
    pub phase: Phase,
    pub workspace: PathBuf,
}

#[async_trait]
pub trait Model: Send + Sync {
    async fn generate(&self, prompt: &str, ctx: &ModelContext) -> IrisResult<String>;

    fn supports_streaming(&self) -> bool {
        false
    }

    fn name(&self) -> &str;
}

/// Empty plan: the run completes without touching any file.
pub const EMPTY_PLAN_RESPONSE: &str =
    r#"{"reasoning": "No model configured; nothing to change.", "edits": []}"#;

/// Returns the same response for every prompt.
pub struct StaticModel {
    response: String,
}

impl StaticModel {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

impl Default for StaticModel {
    fn default() -> Self {
        Self::new(EMPTY_PLAN_RESPONSE)
    }
}

#[async_trait]
impl Model for StaticModel {
    async fn generate(&self, _prompt: &str, _ctx: &ModelContext) -> IrisResult<String> {
        Ok(self.response.clone())
    }

    fn name(&self) -> &str {
        "static"
    }
}
