//! Links command implementation.

use super::CommandContext;
use crate::cli::LinksCommands;
use crate::error::Result;
use crate::storage::{LinkState, METADATA_LAST_RUN_AT, SqliteStorage};

/// Execute a links subcommand.
///
/// # Errors
///
/// Returns an error if the cross-reference store cannot be read.
pub fn execute(command: &LinksCommands, ctx: &CommandContext) -> Result<()> {
    let LinksCommands::List(args) = command;
    let paths = ctx.paths()?;
    let storage = SqliteStorage::open(&paths.links_db)?;

    let links: Vec<_> = storage
        .list_links()?
        .into_iter()
        .filter(|link| !args.partial || link.state == LinkState::Partial)
        .collect();

    if ctx.json {
        return ctx.print_json(&links);
    }

    if links.is_empty() {
        println!("No linked tickets.");
    }
    for link in &links {
        println!(
            "{:<10} -> {:<10} {:<8} comments={:<4} {}",
            link.source_id,
            link.destination_id,
            link.state.as_str(),
            link.comments_created,
            link.subject
        );
    }

    if !ctx.quiet {
        let partial = storage.count_links(Some(LinkState::Partial))?;
        let total = storage.count_links(None)?;
        println!();
        println!("{total} linked, {partial} partial");
        if let Some(last_run) = storage.get_metadata(METADATA_LAST_RUN_AT)? {
            println!("Last run finished at {last_run}");
        }
    }
    Ok(())
}
