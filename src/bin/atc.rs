//! AI Things Considered CLI Binary
//!
//! Generates one day's strip and exits non-zero on any run-level failure.

use ai_things_considered::cli::{load_config, map_error, Cli, RunContext};
use ai_things_considered::logging::init_logging;
use clap::Parser;
use std::process;
use tracing::{error, info};

fn main() {
    // A missing .env is fine; keys may come from the real environment
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", map_error(&e));
            process::exit(1);
        }
    };

    if let Err(e) = init_logging(Some(&config.logging)) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    let context = RunContext::new(config, cli.date);
    info!(date = %context.date(), "atc starting");

    match context.execute() {
        Ok(report) => {
            info!(succeeded = report.succeeded, rotation = %report.rotation, "Run completed");
            print!("{}", report);
        }
        Err(e) => {
            error!(error = %e, "Run failed");
            eprintln!("{}", map_error(&e));
            process::exit(1);
        }
    }
}
