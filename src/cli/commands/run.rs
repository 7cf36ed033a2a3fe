//! Run command implementation.

use super::CommandContext;
use crate::api::{DestinationApi, SourceApi};
use crate::cache::ensure_cache;
use crate::cli::RunArgs;
use crate::config::{FerryConfig, FerryPaths};
use crate::error::Result;
use crate::import::TicketImporter;
use crate::resolve::IdentityResolver;
use crate::run::{RunDriver, RunLog, RunOptions, RunSummary};
use crate::storage::SqliteStorage;
use chrono::Utc;
use std::io::IsTerminal;
use tracing::info;

/// Execute the run command.
///
/// # Errors
///
/// Returns a fatal error (configuration, cache build, source listing,
/// authentication, local storage). Per-ticket failures are only reported.
pub fn execute(args: &RunArgs, ctx: &CommandContext) -> Result<()> {
    let paths = ctx.paths()?;

    let mut ctx = ctx.clone();
    ctx.overrides.cutoff.clone_from(&args.cutoff);
    ctx.overrides.rate_limit_ms = args.rate_limit_ms;
    let config = ctx.config(&paths)?;

    let destination = config.destination_client()?;
    let source = config.source_client()?;

    let options = RunOptions {
        customers: args.customers.clone(),
        limit: args.limit,
        show_progress: !ctx.json && !ctx.quiet && std::io::stderr().is_terminal(),
    };
    let summary = run_with(
        &source,
        &destination,
        &paths,
        &config,
        args.rebuild_cache,
        &options,
    )?;

    if ctx.json {
        return ctx.print_json(&summary);
    }

    println!(
        "Created {} ticket(s) with {} comment(s); skipped {} duplicate(s) and {} before cutoff; {} failed.",
        summary.created,
        summary.comments_created,
        summary.skipped_duplicate,
        summary.skipped_cutoff,
        summary.failed
    );
    for record in summary.records.iter().filter(|r| r.error.is_some()) {
        println!(
            "  {} failed: {}",
            record.source_id,
            record.error.as_deref().unwrap_or_default()
        );
    }
    if let Some(log_path) = &summary.log_path {
        println!("Run log: {}", log_path.display());
    }
    Ok(())
}

/// Load (or build) the reference snapshot, open the store and import every
/// selected source ticket.
///
/// # Errors
///
/// Returns a fatal error; see [`execute`].
pub fn run_with(
    source: &dyn SourceApi,
    destination: &dyn DestinationApi,
    paths: &FerryPaths,
    config: &FerryConfig,
    rebuild_cache: bool,
    options: &RunOptions,
) -> Result<RunSummary> {
    let mut snapshot = ensure_cache(&paths.snapshot, destination, rebuild_cache)?;
    let mut store = SqliteStorage::open(&paths.links_db)?;
    let log = RunLog::create(&paths.logs, Utc::now())?;
    info!(log = %log.path().display(), "Starting run");

    let importer = TicketImporter::new(
        destination,
        &mut store,
        &mut snapshot,
        IdentityResolver::new(config.policy.clone()),
        config.import_settings(),
    );
    let mut driver = RunDriver::new(importer, log);
    driver.run_from_source(source, options)
}
