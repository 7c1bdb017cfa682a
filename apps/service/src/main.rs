mod alerting;
mod audit;
mod cli;
mod config;
mod database;
mod keyed_lock;
mod monitoring;
mod orchestrator;
mod registry;
#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing::warn;

use crate::cli::Cli;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_config(cli.config.as_ref()).context("loading configuration")?;

    let (level, bad_level) = match config.logging.level.parse::<LevelFilter>() {
        Ok(level) => (level, None),
        Err(e) => (LevelFilter::INFO, Some(e)),
    };
    logger::init_with(level, config.logging.format);
    if let Some(e) = bad_level {
        warn!(level = %config.logging.level, error = %e, "Unknown log level, using info");
    }

    cli::run(config, cli.command).await
}
