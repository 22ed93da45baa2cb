mod cli;
mod display;
mod error;
mod launcher;
mod logging;
mod model;
mod orchestrator;
mod registry;
mod report;
mod storage;
mod timefmt;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    logging::init_tracing();

    cli::run(args).await
}
