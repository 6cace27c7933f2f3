//! The phase state machine: INIT → READ → PLAN → WRITE → VERIFY → DONE.
//!
//! A run loads one task from the registry, makes it the context's current
//! task, and executes the phases strictly in order. After every phase the
//! registry task, the context and the journal are updated and the renderer is
//! told, before the next phase starts. Any phase error ends the run in ERROR
//! with the failure recorded on the task's summary; a failed VERIFY first
//! restores every file this attempt wrote.
//!
//! ## Module layout
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `enforce` | Plan validation: ranges, read-before-write, overlaps |
//! | `splice` | Line-range replacement that preserves untouched bytes |

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::config::Config;
use crate::context::{ContextStore, CurrentTask, IntendedEdit, Meta, Plan, Policy, ReadState};
use crate::discovery::{Discovery, WalkDiscovery, resolve_in_workspace, workspace_key};
use crate::errors::{IrisError, IrisResult};
use crate::gates::{ApprovalGate, DialoguerGate};
use crate::journal::{Journal, JournalEntry};
use crate::lock::LockManager;
use crate::model::{CommandModel, Model, ModelPlanner, PlanRequest, Planner, ReadFile, StaticModel};
use crate::task::{Phase, Task, TaskRegistry, TaskStatus};
use crate::ui::{NullRenderer, Renderer, phase_progress};
use crate::util::{sha256_hex, write_atomic};
use crate::verify::{SyntaxVerifier, Verdict, Verifier};

pub mod enforce;
pub mod splice;

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// The workspace had no context yet; it was created and nothing else ran.
    Initialized { project: String },
    Done { task_id: u64, files: Vec<String> },
    /// WRITE confirmation was declined; no file was modified.
    Paused { task_id: u64 },
    Failed {
        task_id: u64,
        phase: Phase,
        error: IrisError,
        rolled_back: Vec<String>,
    },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Initialized { .. } | RunOutcome::Done { .. })
    }
}

/// Files restored (and those that could not be) after a failed VERIFY.
#[derive(Debug, Default, Clone)]
pub struct RollbackReport {
    pub restored: Vec<String>,
    pub failed: Vec<(String, String)>,
}

struct Touched {
    file: String,
    path: PathBuf,
    checkpoint: Checkpoint,
}

/// Per-run working state.
struct Attempt {
    task: Task,
    policy: Policy,
    meta: Meta,
    phase: Phase,
    contents: BTreeMap<String, String>,
    read_state: ReadState,
    plan: Plan,
    touched: Vec<Touched>,
    rollback: Option<RollbackReport>,
}

impl Attempt {
    fn new(task: Task, policy: Policy, meta: Meta) -> Self {
        Self {
            task,
            policy,
            meta,
            phase: Phase::Init,
            contents: BTreeMap::new(),
            read_state: ReadState::default(),
            plan: Plan::default(),
            touched: Vec::new(),
            rollback: None,
        }
    }

    fn touched_files(&self) -> Vec<String> {
        self.touched.iter().map(|t| t.file.clone()).collect()
    }
}

enum Step {
    Completed,
    Paused,
}

pub struct PhaseController {
    root: PathBuf,
    context: ContextStore,
    journal: Journal,
    checkpoints: CheckpointStore,
    registry: TaskRegistry,
    discovery: Box<dyn Discovery>,
    planner: Box<dyn Planner>,
    verifier: Box<dyn Verifier>,
    renderer: Box<dyn Renderer>,
    gate: Box<dyn ApprovalGate>,
    assume_yes: bool,
}

impl PhaseController {
    /// Controller over workspace `root` (canonical) with state in `state_dir`,
    /// using the static model, syntax verifier, interactive gate and no
    /// rendering until replaced.
    pub fn new(root: &Path, state_dir: &Path, locks: LockManager) -> Self {
        Self {
            root: root.to_path_buf(),
            context: ContextStore::new(state_dir, locks.clone()),
            journal: Journal::new(state_dir, locks.clone()),
            checkpoints: CheckpointStore::new(state_dir),
            registry: TaskRegistry::new(state_dir, locks),
            discovery: Box::new(WalkDiscovery::default()),
            planner: Box::new(ModelPlanner::new(Arc::new(StaticModel::default()))),
            verifier: Box::new(SyntaxVerifier::default()),
            renderer: Box::new(NullRenderer),
            gate: Box::new(DialoguerGate),
            assume_yes: false,
        }
    }

    /// Controller wired from configuration: discovery settings, the configured
    /// model (static when none), verifier interpreter and summary limit.
    pub fn from_config(config: &Config) -> Self {
        let model: Arc<dyn Model> = match config.model_command() {
            Some((program, args)) => {
                Arc::new(CommandModel::new(program, args, config.model_timeout()))
            }
            None => Arc::new(StaticModel::default()),
        };
        Self::new(&config.project_dir, &config.state_dir, config.locks())
            .with_summary_limit(config.toml.summary.max_chars)
            .with_discovery(WalkDiscovery::new(config.toml.discovery.clone()))
            .with_planner(ModelPlanner::new(model))
            .with_verifier(SyntaxVerifier::new(config.toml.verify.python.clone()))
    }

    pub fn with_summary_limit(self, max_chars: usize) -> Self {
        Self {
            context: self.context.with_summary_limit(max_chars),
            ..self
        }
    }

    pub fn with_discovery(mut self, discovery: impl Discovery + 'static) -> Self {
        self.discovery = Box::new(discovery);
        self
    }

    pub fn with_planner(mut self, planner: impl Planner + 'static) -> Self {
        self.planner = Box::new(planner);
        self
    }

    pub fn with_verifier(mut self, verifier: impl Verifier + 'static) -> Self {
        self.verifier = Box::new(verifier);
        self
    }

    pub fn with_renderer(mut self, renderer: impl Renderer + 'static) -> Self {
        self.renderer = Box::new(renderer);
        self
    }

    pub fn with_gate(mut self, gate: impl ApprovalGate + 'static) -> Self {
        self.gate = Box::new(gate);
        self
    }

    /// Treat WRITE confirmation as given (`--yes`). Only honoured when the
    /// context policy is unrestricted.
    pub fn assume_yes(mut self, yes: bool) -> Self {
        self.assume_yes = yes;
        self
    }

    /// Run task `task_id` through every phase.
    ///
    /// Errors before the task starts (unknown task, unreadable context) are
    /// returned directly; everything after is reported as a [`RunOutcome`].
    pub async fn run(&self, task_id: u64) -> IrisResult<RunOutcome> {
        if !self.context.is_initialized() {
            return self.initialize_only(task_id);
        }

        let task = self.registry.require(task_id)?;
        let ctx = self.context.load()?;
        let mut attempt = Attempt::new(task, ctx.policy, ctx.meta);

        let started = match self.start(&mut attempt) {
            Ok(()) => self.execute(&mut attempt).await,
            Err(error) => Err(error),
        };
        let outcome = match started {
            Ok(Step::Completed) => match self.complete(&mut attempt) {
                Ok(outcome) => outcome,
                Err(error) => self.fail(&mut attempt, error),
            },
            Ok(Step::Paused) => match self.pause(&mut attempt) {
                Ok(outcome) => outcome,
                Err(error) => self.fail(&mut attempt, error),
            },
            Err(error) => self.fail(&mut attempt, error),
        };

        if let Err(err) = self.renderer.finish(&outcome) {
            warn!(%err, "renderer failed to show outcome");
        }
        Ok(outcome)
    }

    fn initialize_only(&self, task_id: u64) -> IrisResult<RunOutcome> {
        let project = crate::init::default_project_name(&self.root);
        self.context.initialize(&project)?;
        let desc = format!("Initialized context for project {project}");
        self.journal.append(
            JournalEntry::new(task_id, Phase::Init, desc.clone()),
            &Meta::default(),
        )?;
        info!(project = %project, "context initialized; task not started");
        self.report_status(Phase::Init, &desc);

        let outcome = RunOutcome::Initialized { project };
        if let Err(err) = self.renderer.finish(&outcome) {
            warn!(%err, "renderer failed to show outcome");
        }
        Ok(outcome)
    }

    /// Mark the task running and make it current. A failure here goes
    /// through [`Self::fail`] so the task never stays `running`.
    fn start(&self, a: &mut Attempt) -> IrisResult<()> {
        a.task.status = TaskStatus::Running;
        a.task.phase = Phase::Init;
        a.task = self.registry.update(&a.task)?;
        self.context
            .set_current_task(CurrentTask::from_task(&a.task))?;
        info!(task_id = a.task.id, goal = %a.task.goal, "run started");
        Ok(())
    }

    async fn execute(&self, a: &mut Attempt) -> IrisResult<Step> {
        let started = format!("Started task {}: {}", a.task.id, a.task.goal);
        self.record(a, Phase::Init, started, None)?;
        self.read_phase(a)?;
        self.plan_phase(a).await?;
        if !self.write_phase(a)? {
            return Ok(Step::Paused);
        }
        self.verify_phase(a).await?;
        Ok(Step::Completed)
    }

    /// Persist a finished phase: context, registry, journal, then renderer.
    fn record(
        &self,
        a: &mut Attempt,
        phase: Phase,
        desc: String,
        meta: Option<serde_json::Value>,
    ) -> IrisResult<()> {
        a.phase = phase;
        self.context.update_task_status(a.task.status, phase)?;
        a.task.summary = self.context.merge_summary(&desc)?;
        a.task.phase = phase;
        a.task = self.registry.update(&a.task)?;

        let mut entry = JournalEntry::new(a.task.id, phase, desc.clone());
        if let Some(meta) = meta {
            entry = entry.with_meta(meta);
        }
        self.journal.append(entry, &a.meta)?;

        info!(task_id = a.task.id, phase = %phase, "{desc}");
        self.report_status(phase, &desc);
        Ok(())
    }

    fn report_status(&self, phase: Phase, desc: &str) {
        if let Err(err) = self.renderer.status(phase, desc, phase_progress(phase)) {
            warn!(%err, phase = %phase, "renderer status failed");
        }
    }

    fn read_phase(&self, a: &mut Attempt) -> IrisResult<()> {
        a.phase = Phase::Read;
        let declared = !a.task.files.is_empty();
        let candidates = if declared {
            a.task
                .files
                .iter()
                .map(|f| workspace_key(&self.root, f))
                .collect::<IrisResult<Vec<_>>>()?
        } else {
            self.discovery.discover(&self.root)?
        };

        let mut read_state = ReadState::default();
        let mut files = Vec::new();
        for file in candidates {
            let path = resolve_in_workspace(&self.root, &file)?;
            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    return Err(IrisError::FileNotFound { path });
                }
                Err(err) => return Err(err.into()),
            };
            let hash = sha256_hex(&bytes);
            let content = match String::from_utf8(bytes) {
                Ok(content) => content,
                Err(_) if !declared => {
                    debug!(file = %file, "skipping non-UTF-8 file");
                    continue;
                }
                Err(_) => {
                    return Err(IrisError::Io(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("{file} is not valid UTF-8"),
                    )));
                }
            };
            read_state.record(&file, splice::full_range(&content), hash);
            a.contents.insert(file.clone(), content);
            files.push(file);
        }

        let snapshot = read_state.clone();
        self.context.update_current_task(move |t| {
            t.read_state = snapshot;
            t.plan = Plan::default();
            Ok(())
        })?;
        a.read_state = read_state;

        let desc = if files.is_empty() {
            "Read 0 files.".to_string()
        } else {
            format!("Read {} file(s): {}.", files.len(), files.join(", "))
        };
        self.record(a, Phase::Read, desc, Some(json!({ "files": files })))
    }

    async fn plan_phase(&self, a: &mut Attempt) -> IrisResult<()> {
        a.phase = Phase::Plan;
        let files: Vec<ReadFile> = a
            .contents
            .iter()
            .map(|(path, content)| ReadFile {
                path: path.clone(),
                content: content.clone(),
            })
            .collect();

        let mut plan = {
            let request = PlanRequest {
                task_id: a.task.id,
                goal: &a.task.goal,
                workspace: self.root.clone(),
                read_state: &a.read_state,
                files: &files,
            };
            self.planner.plan(&request).await?
        };

        enforce::validate_plan(&mut plan, &self.root, &a.read_state, &a.contents, &a.policy)?;

        let stored = plan.clone();
        self.context.update_current_task(move |t| {
            t.plan = stored;
            Ok(())
        })?;

        for edit in &plan.intended_edits {
            let entry = JournalEntry::new(
                a.task.id,
                Phase::Plan,
                format!("Intended edit {} lines {}: {}", edit.file, edit.range, edit.reason),
            )
            .with_meta(json!({
                "file": edit.file,
                "range": edit.range,
                "has_content": edit.is_applicable(),
            }));
            self.journal.append(entry, &a.meta)?;
        }

        let count = plan.intended_edits.len();
        a.plan = plan;
        self.record(
            a,
            Phase::Plan,
            format!("Planned {count} edit(s)."),
            Some(json!({ "edits": count })),
        )
    }

    /// Returns `false` when the confirmation was declined.
    fn write_phase(&self, a: &mut Attempt) -> IrisResult<bool> {
        a.phase = Phase::Write;
        let mut by_file: BTreeMap<String, Vec<IntendedEdit>> = BTreeMap::new();
        for edit in a.plan.applicable_edits() {
            by_file.entry(edit.file.clone()).or_default().push(edit.clone());
        }

        if by_file.is_empty() {
            self.record(a, Phase::Write, "No edits to apply.".to_string(), None)?;
            return Ok(true);
        }

        if a.policy.requires_confirmation(self.assume_yes) {
            for edit in a.plan.applicable_edits() {
                let original = edit.original_content.as_deref().unwrap_or_default();
                let new = edit.new_content.as_deref().unwrap_or_default();
                if let Err(err) = self.renderer.preview(&edit.file, original, new) {
                    warn!(%err, file = %edit.file, "preview failed");
                }
            }
            let approved = self
                .gate
                .confirm_write(&a.plan)
                .map_err(|e| IrisError::write_failure(&self.root, format!("confirmation failed: {e}")))?;
            if !approved {
                info!(task_id = a.task.id, "write declined");
                return Ok(false);
            }
        }

        let edit_count: usize = by_file.values().map(Vec::len).sum();
        for (file, edits) in &by_file {
            let path = resolve_in_workspace(&self.root, file)?;
            let touched = self.write_file(a, file, &path, edits)?;
            a.touched.push(touched);
        }

        let files = a.touched_files();
        self.record(
            a,
            Phase::Write,
            format!(
                "Applied {edit_count} edit(s) to {} file(s): {}.",
                files.len(),
                files.join(", ")
            ),
            Some(json!({ "files": files })),
        )?;
        Ok(true)
    }

    /// Stale-check, checkpoint, splice and atomically replace one file.
    fn write_file(
        &self,
        a: &Attempt,
        file: &str,
        path: &Path,
        edits: &[IntendedEdit],
    ) -> IrisResult<Touched> {
        let current = match fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => return Err(IrisError::write_failure(path, err)),
        };

        if let Some(read) = a.read_state.get(file) {
            let hash = current.as_deref().map(sha256_hex);
            if hash.as_deref() != Some(read.hash.as_str()) {
                return Err(IrisError::write_failure(
                    path,
                    "file changed since it was read (stale read)",
                ));
            }
        }

        let content = match current {
            Some(bytes) => String::from_utf8(bytes)
                .map_err(|_| IrisError::write_failure(path, "file is not valid UTF-8"))?,
            None => String::new(),
        };

        let checkpoint = self
            .checkpoints
            .capture(a.task.id, path)
            .map_err(|e| IrisError::write_failure(path, format!("checkpoint failed: {e}")))?;

        let refs: Vec<&IntendedEdit> = edits.iter().collect();
        let updated = splice::apply(&content, &refs).map_err(|m| IrisError::write_failure(path, m))?;
        write_atomic(path, updated.as_bytes()).map_err(|e| IrisError::write_failure(path, e))?;
        debug!(file, edits = edits.len(), "file written");

        Ok(Touched {
            file: file.to_string(),
            path: path.to_path_buf(),
            checkpoint,
        })
    }

    async fn verify_phase(&self, a: &mut Attempt) -> IrisResult<()> {
        a.phase = Phase::Verify;
        let mut failures = Vec::new();
        for touched in &a.touched {
            match self.verifier.verify(&touched.path).await {
                Ok(Verdict::Passed) => {}
                Ok(Verdict::Failed(message)) => failures.push((touched.file.clone(), message)),
                Err(err) => failures.push((touched.file.clone(), err.to_string())),
            }
        }

        if failures.is_empty() {
            let desc = format!("Verified {} file(s).", a.touched.len());
            return self.record(a, Phase::Verify, desc, None);
        }

        warn!(task_id = a.task.id, failed = failures.len(), "verification failed; rolling back");
        let report = self.rollback(a);
        a.rollback = Some(report);
        Err(IrisError::VerificationFailure {
            files: failures.iter().map(|(f, _)| f.clone()).collect(),
            message: failures
                .iter()
                .map(|(f, m)| format!("{f}: {m}"))
                .collect::<Vec<_>>()
                .join("; "),
        })
    }

    /// Restore every file this attempt wrote from the checkpoint taken just
    /// before it was written, newest first.
    fn rollback(&self, a: &Attempt) -> RollbackReport {
        let mut report = RollbackReport::default();
        for touched in a.touched.iter().rev() {
            match self.checkpoints.restore(&touched.checkpoint, &touched.path) {
                Ok(()) => report.restored.push(touched.file.clone()),
                Err(err) => {
                    warn!(file = %touched.file, %err, "restore failed");
                    report.failed.push((touched.file.clone(), err.to_string()));
                }
            }
        }
        report.restored.reverse();
        report
    }

    fn complete(&self, a: &mut Attempt) -> IrisResult<RunOutcome> {
        a.task.status = TaskStatus::Done;
        self.record(a, Phase::Verify, "Task completed.".to_string(), None)?;
        Ok(RunOutcome::Done {
            task_id: a.task.id,
            files: a.touched_files(),
        })
    }

    fn pause(&self, a: &mut Attempt) -> IrisResult<RunOutcome> {
        a.task.status = TaskStatus::Paused;
        self.record(
            a,
            Phase::Write,
            "Write declined; task paused.".to_string(),
            None,
        )?;
        Ok(RunOutcome::Paused { task_id: a.task.id })
    }

    /// Escalate to ERROR. Persistence problems here are logged, never raised,
    /// so the original error is what the caller sees.
    fn fail(&self, a: &mut Attempt, error: IrisError) -> RunOutcome {
        let phase = a.phase;
        let mut desc = format!("{} in {}: {}.", error.tag(), phase, error);
        let mut rolled_back = Vec::new();
        let mut restore_failures = Vec::new();
        match &a.rollback {
            Some(report) => {
                rolled_back = report.restored.clone();
                if !rolled_back.is_empty() {
                    desc.push_str(&format!(" Rolled back: {}.", rolled_back.join(", ")));
                }
                restore_failures = report
                    .failed
                    .iter()
                    .map(|(f, e)| format!("{f} ({e})"))
                    .collect();
                if !restore_failures.is_empty() {
                    desc.push_str(&format!(" Restore failed: {}.", restore_failures.join(", ")));
                }
            }
            None if !a.touched.is_empty() => {
                desc.push_str(&format!(
                    " Modified before failure: {}.",
                    a.touched_files().join(", ")
                ));
            }
            None => {}
        }

        warn!(task_id = a.task.id, phase = %phase, error = %error, "task failed");
        a.task.status = TaskStatus::Error;
        a.task.phase = phase;

        if let Err(err) = self.context.update_task_status(TaskStatus::Error, phase) {
            warn!(%err, "could not record failure in context");
        }
        match self.context.merge_summary(&desc) {
            Ok(summary) => a.task.summary = summary,
            Err(err) => {
                warn!(%err, "could not merge failure into summary");
                a.task.summary = crate::context::summary::merge(
                    &a.task.summary,
                    &desc,
                    self.context.summary_limit(),
                );
            }
        }
        if let Err(err) = self.registry.update(&a.task) {
            warn!(%err, "could not record failure in registry");
        }
        let entry = JournalEntry::new(a.task.id, phase, desc.clone()).with_meta(json!({
            "error": error.tag(),
            "rolled_back": rolled_back,
            "restore_failures": restore_failures,
            "modified": a.touched_files(),
        }));
        if let Err(err) = self.journal.append(entry, &a.meta) {
            warn!(%err, "could not journal failure");
        }
        self.report_status(phase, &desc);

        RunOutcome::Failed {
            task_id: a.task.id,
            phase,
            error,
            rolled_back,
        }
    }
}
