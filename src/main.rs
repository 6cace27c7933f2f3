use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;

use iris::config::Config;
use iris::errors::tag_of;

mod cmd;

#[derive(Parser)]
#[command(name = "iris")]
#[command(version, about = "Deterministic READ, PLAN, WRITE, VERIFY task controller")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Workspace root (defaults to the current directory)
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create .context and initialize the project
    Init {
        /// Project name (defaults to the directory name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Create a task and make it current
    New {
        goal: String,
        /// File the task works on; repeat for several. Without any, READ discovers files.
        #[arg(short, long = "file")]
        files: Vec<String>,
    },
    /// List all tasks
    List,
    /// Run a task through READ, PLAN, WRITE and VERIFY
    Run {
        id: u64,
        /// Apply edits without asking (only when the policy is unrestricted)
        #[arg(short, long)]
        yes: bool,
    },
    /// Show a task and its recent activity
    Attach {
        id: u64,
        /// Keep printing new activity until the task stops running
        #[arg(short, long)]
        follow: bool,
    },
    /// Show the journal entries of a task
    Logs { id: u64 },
    /// Show the project and the current task
    Status,
    /// Delete checkpoints of finished tasks
    Prune {
        /// Also prune failed and paused tasks
        #[arg(long)]
        all: bool,
    },
    /// View or initialize configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a default iris.toml
    Init,
}

async fn dispatch(cli: Cli) -> Result<()> {
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    // Model commands are often configured per workspace.
    let _ = dotenvy::from_path(project_dir.join(".env"));

    let config = Config::new(project_dir, cli.verbose)?;
    let log_dir = (config.toml.logging.file && config.state_dir.exists()).then(|| config.log_dir());
    let _log_guard = iris::logging::init(cli.verbose, log_dir.as_deref());

    match cli.command {
        Commands::Init { name } => cmd::cmd_init(&config, name.as_deref())?,
        Commands::New { goal, files } => cmd::cmd_new(&config, &goal, &files)?,
        Commands::List => cmd::cmd_list(&config)?,
        Commands::Run { id, yes } => cmd::cmd_run(&config, id, yes).await?,
        Commands::Attach { id, follow } => cmd::cmd_attach(&config, id, follow).await?,
        Commands::Logs { id } => cmd::cmd_logs(&config, id)?,
        Commands::Status => cmd::cmd_status(&config)?,
        Commands::Prune { all } => cmd::cmd_prune(&config, all)?,
        Commands::Config { command } => cmd::cmd_config(&config, command)?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {}: {:#}", style("IRIS ▸ ERROR ▸").red().bold(), tag_of(&err), err);
            ExitCode::FAILURE
        }
    }
}
