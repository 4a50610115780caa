//! trackermerge CLI — merge remote BitTorrent tracker lists.
//!
//! Reads a seed list of source URLs, fetches each tracker list, and writes a
//! single deduplicated list.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
