mod analyzer;
mod auth;
mod cli;
mod config;
mod error;
mod extract;
mod output;
mod patterns;
mod pipeline;
mod providers;
mod publisher;

use clap::Parser;
use cli::{Cli, Outcome};
use log::{error, info};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting failtriage - Workflow Failure Analyzer");

    match cli.execute().await {
        Ok(outcome) => outcome.into(),
        Err(e) => {
            error!("Critical failure: {e:#}");
            Outcome::Fatal.into()
        }
    }
}
