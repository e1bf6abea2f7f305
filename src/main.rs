mod cac;
mod cli;
mod compass;
mod config;
mod error;
mod fan_out;
mod gitlab;
mod insights;
mod metrics;
mod output;
mod platform;
mod server;
mod services;
mod webhook;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting compass-gitlab");
    cli.execute().await?;

    Ok(())
}
