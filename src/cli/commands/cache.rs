//! Cache command implementation.

use super::CommandContext;
use crate::cache::{ReferenceSnapshot, build_snapshot, clear_cache};
use crate::cli::CacheCommands;
use crate::error::Result;
use crate::model::EntityKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Serialize)]
struct CacheOutput {
    path: PathBuf,
    exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    built_at: Option<DateTime<Utc>>,
    counts: BTreeMap<EntityKind, usize>,
}

/// Execute a cache subcommand.
///
/// # Errors
///
/// Returns an error if the snapshot cannot be built, read or removed.
pub fn execute(command: &CacheCommands, ctx: &CommandContext) -> Result<()> {
    let paths = ctx.paths()?;

    match command {
        CacheCommands::Build => {
            let config = ctx.config(&paths)?;
            let destination = config.destination_client()?;
            let snapshot = build_snapshot(&destination)?;
            snapshot.save(&paths.snapshot)?;
            info!(path = %paths.snapshot.display(), "Reference snapshot rebuilt");
            report(ctx, paths.snapshot, Some(&snapshot))
        }
        CacheCommands::Show => {
            let snapshot = if paths.snapshot.exists() {
                Some(ReferenceSnapshot::load(&paths.snapshot)?)
            } else {
                None
            };
            report(ctx, paths.snapshot, snapshot.as_ref())
        }
        CacheCommands::Clear => {
            let removed = clear_cache(&paths.snapshot)?;
            if ctx.json {
                return ctx.print_json(&serde_json::json!({
                    "path": paths.snapshot,
                    "removed": removed,
                }));
            }
            if removed {
                println!("Removed {}; the next run rebuilds it.", paths.snapshot.display());
            } else {
                println!("No reference snapshot at {}", paths.snapshot.display());
            }
            Ok(())
        }
    }
}

fn report(ctx: &CommandContext, path: PathBuf, snapshot: Option<&ReferenceSnapshot>) -> Result<()> {
    let output = CacheOutput {
        path,
        exists: snapshot.is_some(),
        built_at: snapshot.map(|s| s.built_at),
        counts: snapshot.map(ReferenceSnapshot::counts).unwrap_or_default(),
    };

    if ctx.json {
        return ctx.print_json(&output);
    }

    let Some(built_at) = output.built_at else {
        println!(
            "No reference snapshot at {} (the next run builds it)",
            output.path.display()
        );
        return Ok(());
    };

    println!("Reference snapshot: {}", output.path.display());
    println!("Built at: {}", built_at.format("%Y-%m-%d %H:%M:%S UTC"));
    for (kind, count) in &output.counts {
        println!("  {:<12} {count}", kind.as_str());
    }
    Ok(())
}
