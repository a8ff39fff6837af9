mod app;
mod cli;
mod config;
mod import;
mod ledger;
mod logging;
mod queue;
mod scoring;

use std::process;

use anyhow::Result;
use log::error;

fn main() {
    if let Err(e) = run() {
        // User-facing failures (bad patterns, malformed payloads) go straight
        // to stderr; everything else is also logged.
        error!("Application error: {:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = cli::args::parse_args();
    cli::args::validate_args(&args)?;

    let log_config = app::logging_config(&args)?;
    logging::init_logger(log_config)?;

    let config_manager = app::load_configuration(&args)?;
    app::run(args, &config_manager)
}
