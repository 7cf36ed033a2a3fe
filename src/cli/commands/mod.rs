//! Command implementations.

pub mod cache;
pub mod init;
pub mod links;
pub mod run;

use crate::cli::{Cli, Commands};
use crate::config::{self, CliOverrides, FerryConfig, FerryPaths};
use crate::error::{FerryError, Result};
use serde::Serialize;
use std::path::PathBuf;

/// Global flags shared by every command.
#[derive(Debug, Clone, Default)]
pub struct CommandContext {
    pub dir: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
    pub overrides: CliOverrides,
}

impl CommandContext {
    #[must_use]
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            dir: cli.dir.clone(),
            json: cli.json,
            quiet: cli.quiet,
            overrides: CliOverrides {
                destination_url: cli.destination_url.clone(),
                ..CliOverrides::default()
            },
        }
    }

    /// Resolve the ferry directory from `--dir` or discovery.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` if no ferry directory exists.
    pub fn paths(&self) -> Result<FerryPaths> {
        let dir = match &self.dir {
            Some(dir) if dir.is_dir() => dir.clone(),
            Some(_) => return Err(FerryError::NotInitialized),
            None => config::discover_ferry_dir(None)?,
        };
        Ok(FerryPaths::new(&dir))
    }

    /// Load and type-check the merged configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a config source is unreadable or invalid.
    pub fn config(&self, paths: &FerryPaths) -> Result<FerryConfig> {
        let layer = config::load_config(&paths.dir, &self.overrides)?;
        FerryConfig::from_layer(&layer)
    }

    /// Print `value` as pretty JSON on stdout.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn print_json<T: Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

/// Run the parsed command line.
///
/// # Errors
///
/// Returns whatever the selected command fails with.
pub fn dispatch(cli: &Cli) -> Result<()> {
    let ctx = CommandContext::from_cli(cli);
    match &cli.command {
        Commands::Init(args) => init::execute(args, &ctx),
        Commands::Run(args) => run::execute(args, &ctx),
        Commands::Cache { command } => cache::execute(command, &ctx),
        Commands::Links { command } => links::execute(command, &ctx),
    }
}
