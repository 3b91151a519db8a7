mod crawl;
mod data_io;
mod enrich;
mod error;
mod fetch;
mod listing;
mod registry;
mod runtime;
mod types;

use std::process::ExitCode;

use clap::Parser;

pub use error::HarvestError;
use types::{Cli, Command, HarvestArgs};

pub async fn run() -> Result<ExitCode, HarvestError> {
    let cli = Cli::parse();
    runtime::init_logging(cli.verbose);

    let command = match cli.command {
        Some(command) => command,
        None => Command::Harvest(HarvestArgs::from_env().unwrap_or_else(|err| err.exit())),
    };
    match command {
        Command::Harvest(args) => {
            let summary = runtime::run_harvest(&cli.store, args).await;
            Ok(if summary.error.is_some() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
        Command::Stats => runtime::run_stats(&cli.store).map(|_| ExitCode::SUCCESS),
        Command::Export(args) => runtime::run_export(&cli.store, &args).map(|_| ExitCode::SUCCESS),
        Command::Lookup(args) => runtime::run_lookup(&cli.store, &args).await.map(|_| ExitCode::SUCCESS),
    }
}
