//! Command-line interface for `tferry`.

pub mod commands;

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// Migrate helpdesk tickets from SuperOps into Syncro without duplicates.
#[derive(Parser, Debug)]
#[command(name = "tferry", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output machine-readable JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Also write JSON diagnostic logs to this file
    #[arg(long, value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Ferry directory (default: nearest .ferry above the current directory)
    #[arg(long, value_name = "DIR", env = "FERRY_DIR", global = true)]
    pub dir: Option<PathBuf>,

    /// Syncro API base URL, e.g. https://acme.syncromsp.com/api/v1
    #[arg(long, value_name = "URL", env = "SYNCRO_URL", global = true)]
    pub destination_url: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a .ferry directory with a starter config
    Init(InitArgs),

    /// Import every source ticket that is not on the destination yet
    Run(RunArgs),

    /// Manage the reference snapshot
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Inspect the source -> destination cross-reference store
    Links {
        #[command(subcommand)]
        command: LinksCommands,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct InitArgs {
    /// Overwrite an existing config.yaml
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Only import tickets of this customer (repeatable)
    #[arg(long = "customer", value_name = "NAME")]
    pub customers: Vec<String>,

    /// Stop after this many tickets
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,

    /// Rebuild the reference snapshot before importing
    #[arg(long)]
    pub rebuild_cache: bool,

    /// Skip tickets created before this date (overrides import.cutoff)
    #[arg(long, value_name = "DATE")]
    pub cutoff: Option<String>,

    /// Minimum milliseconds between API requests (overrides http.rate-limit-ms)
    #[arg(long, value_name = "MS")]
    pub rate_limit_ms: Option<u64>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CacheCommands {
    /// Query the destination and rewrite the snapshot
    Build,
    /// Show snapshot age and record counts
    Show,
    /// Delete the snapshot so the next run rebuilds it
    Clear,
}

#[derive(Subcommand, Debug, Clone)]
pub enum LinksCommands {
    /// List imported tickets
    List(LinksListArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct LinksListArgs {
    /// Only show tickets whose comments were not all replicated
    #[arg(long)]
    pub partial: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_accepts_repeated_customers() {
        let cli = Cli::parse_from([
            "tferry", "run", "--customer", "Acme", "--customer", "Globex", "--limit", "5", "-vv",
        ]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.customers, vec!["Acme", "Globex"]);
                assert_eq!(args.limit, Some(5));
                assert!(!args.rebuild_cache);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
