use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{Model, ModelContext};
use crate::context::{IntendedEdit, LineRange, Plan, ReadState};
use crate::errors::{IrisError, IrisResult};
use crate::task::Phase;
use crate::util::{extract_json_object, truncate_chars};

/// A file as it was read during READ.
#[derive(Debug, Clone)]
pub struct ReadFile {
    pub path: String,
    pub content: String,
}

/// Everything a planner may look at.
pub struct PlanRequest<'a> {
    pub task_id: u64,
    pub goal: &'a str,
    pub workspace: PathBuf,
    pub read_state: &'a ReadState,
    pub files: &'a [ReadFile],
}

/// Produces the edits for a task. Validation is the caller's job.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, request: &PlanRequest<'_>) -> IrisResult<Plan>;
}

#[derive(Debug, Deserialize)]
struct ModelPlan {
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    edits: Vec<ModelEdit>,
}

#[derive(Debug, Deserialize)]
struct ModelEdit {
    file: String,
    range: [usize; 2],
    #[serde(default)]
    reason: String,
    #[serde(default)]
    new_content: Option<String>,
}

/// Asks a [`Model`] for a JSON plan and parses the reply.
pub struct ModelPlanner {
    model: Arc<dyn Model>,
}

impl ModelPlanner {
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self { model }
    }

    pub fn build_prompt(request: &PlanRequest<'_>) -> String {
        let mut prompt = String::new();
        let _ = writeln!(prompt, "# Goal\n\n{}\n", request.goal);
        let _ = writeln!(prompt, "# Files\n");
        for file in request.files {
            let _ = writeln!(prompt, "## {}\n", file.path);
            let _ = writeln!(prompt, "```");
            for (i, line) in file.content.split('\n').enumerate() {
                let _ = writeln!(prompt, "{:>5} | {}", i + 1, line);
            }
            let _ = writeln!(prompt, "```\n");
        }
        prompt.push_str(
            "# Response format\n\n\
             Reply with a single JSON object and nothing else:\n\
             {\"reasoning\": \"...\", \"edits\": [{\"file\": \"path\", \"range\": [start, end], \
             \"reason\": \"...\", \"new_content\": \"replacement lines\"}]}\n\n\
             Ranges are 1-based and inclusive, refer to the line numbers above, and must not \
             overlap within a file. `new_content` replaces the whole range; separate lines with \\n.\n",
        );
        prompt
    }

    pub fn parse_response(text: &str) -> IrisResult<Plan> {
        let json = extract_json_object(text).ok_or_else(|| {
            IrisError::InvalidPlan(format!(
                "model response contains no JSON object: {}",
                truncate_chars(text.trim(), 120)
            ))
        })?;
        let parsed: ModelPlan = serde_json::from_str(&json)
            .map_err(|e| IrisError::InvalidPlan(format!("model response is not a plan: {e}")))?;

        Ok(Plan {
            reasoning: parsed.reasoning,
            intended_edits: parsed
                .edits
                .into_iter()
                .map(|e| IntendedEdit {
                    file: e.file,
                    range: LineRange::from(e.range),
                    reason: e.reason,
                    original_content: None,
                    new_content: e.new_content,
                })
                .collect(),
        })
    }
}

#[async_trait]
impl Planner for ModelPlanner {
    async fn plan(&self, request: &PlanRequest<'_>) -> IrisResult<Plan> {
        let prompt = Self::build_prompt(request);
        let ctx = ModelContext {
            task_id: request.task_id,
            phase: Phase::Plan,
            workspace: request.workspace.clone(),
        };
        debug!(model = self.model.name(), chars = prompt.len(), "requesting plan");
        let text = self.model.generate(&prompt, &ctx).await?;
        Self::parse_response(&text)
    }
}
