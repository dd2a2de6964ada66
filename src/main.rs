// Certwarden entry point
// Parses the command line, sets up logging and hands off to the command handlers

use certwarden::cli::{self, Cli};
use certwarden::observability;
use clap::Parser;
use std::process::ExitCode;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    if let Err(e) = observability::init(cli.verbose, cli.log_json) {
        cli::error(&format!("Failed to initialize logging: {:#}", e));
        return ExitCode::from(2);
    }

    match cli::commands::execute(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Command failed");
            cli::error(&format!("{:#}", e));
            ExitCode::from(2)
        }
    }
}
