//! Configuration view and setup: `iris config`.

use anyhow::{Context, Result};

use iris::config::{Config, IrisToml};

use super::super::ConfigCommands;

pub fn cmd_config(config: &Config, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = config.config_file();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Iris Configuration");
            println!("==================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No iris.toml found at {}", config_path.display());
                println!("Using default configuration:");
            }
            println!();
            let rendered = toml::to_string_pretty(&config.toml)
                .context("Failed to render configuration")?;
            for line in rendered.lines() {
                println!("  {line}");
            }
            println!();

            println!("Effective values (with env overrides):");
            match config.model_command() {
                Some((program, args)) if args.is_empty() => println!("  model = \"{program}\""),
                Some((program, args)) => {
                    println!("  model = \"{program} {}\"", args.join(" "))
                }
                None => println!("  model = static (no command configured)"),
            }
            println!("  model_timeout = {}s", config.model_timeout().as_secs());
            let lock = config.lock_settings();
            println!("  lock_timeout = {}ms", lock.timeout.as_millis());
            println!("  lock_poll = {}ms", lock.poll_interval.as_millis());
            println!();
        }
        Some(ConfigCommands::Validate) => {
            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {warning}");
                }
            }
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("iris.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }
            std::fs::create_dir_all(&config.state_dir).with_context(|| {
                format!("Failed to create directory: {}", config.state_dir.display())
            })?;
            IrisToml::default().save(&config_path)?;
            println!("Created iris.toml at {}", config_path.display());
        }
    }

    Ok(())
}
