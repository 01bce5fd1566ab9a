//! autodrive CLI entry point
//!
//! A thin composition layer: parse arguments, initialize logging, route
//! the command, and funnel failures through the fatal-error handler.

use clap::Parser;

use autodrive::app::{handle_fatal_error, init_logging, AppConfig};
use autodrive::cli::{execute_command, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let app_config = AppConfig::new(cli.verbose);
    init_logging(&app_config);

    if let Err(e) = execute_command(cli.command).await {
        handle_fatal_error(e, cli.verbose);
    }
}
