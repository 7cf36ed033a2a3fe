//! Init command implementation.

use super::CommandContext;
use crate::cli::InitArgs;
use crate::config::{DEFAULT_CONFIG_YAML, FERRY_DIR_NAME, FerryPaths};
use crate::error::Result;
use crate::storage::SqliteStorage;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Serialize)]
struct InitOutput {
    dir: PathBuf,
    config_written: bool,
}

/// Execute the init command.
///
/// Creates the ferry directory (from `--dir`, or `./.ferry`), a starter
/// `config.yaml`, the `logs/` directory and an empty cross-reference store.
///
/// # Errors
///
/// Returns an error if any of them cannot be created.
pub fn execute(args: &InitArgs, ctx: &CommandContext) -> Result<()> {
    let dir = match &ctx.dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?.join(FERRY_DIR_NAME),
    };
    let paths = FerryPaths::new(&dir);
    fs::create_dir_all(&paths.logs)?;

    let config_written = args.force || !paths.config.exists();
    if config_written {
        fs::write(&paths.config, DEFAULT_CONFIG_YAML)?;
    }

    SqliteStorage::open(&paths.links_db)?;
    info!(dir = %dir.display(), config_written, "Initialized ferry directory");

    if ctx.json {
        return ctx.print_json(&InitOutput {
            dir,
            config_written,
        });
    }

    println!("Initialized ferry directory at {}", dir.display());
    if config_written {
        println!("  wrote {}", paths.config.display());
    } else {
        println!("  kept existing {} (use --force to overwrite)", paths.config.display());
    }
    Ok(())
}
