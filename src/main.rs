use clap::Parser;
use std::process::ExitCode;
use ticket_ferry::cli::{Cli, commands};
use ticket_ferry::logging::init_logging;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.quiet, cli.log_file.as_deref()) {
        eprintln!("Failed to initialize logging: {e}");
    }

    match commands::dispatch(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err.exit_code();
            if cli.json {
                let payload = serde_json::json!({
                    "error": err.to_string(),
                    "code": code,
                    "fatal": err.is_fatal(),
                });
                eprintln!("{payload}");
            } else {
                eprintln!("Error: {err}");
            }
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}
