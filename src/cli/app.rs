use anyhow::Result;
use clap::Parser;
use tracing::{debug, error, info, warn};

use super::args::{CliArgs, Commands};
use super::cache::cmd_cache;
use super::config::cmd_config;
use super::plan::cmd_plan;
use crate::config::{load_config, LoadedConfig};
use crate::runtime::init_logging;

pub async fn run() -> Result<()> {
    let cli = CliArgs::parse();

    let LoadedConfig {
        mut config,
        path,
        from_file,
    } = load_config(cli.config.as_deref())?;
    cli.apply(&mut config);

    let _log_guard = init_logging(&config.logging, cli.debug)?;
    debug!("Starting tapline v{}", env!("CARGO_PKG_VERSION"));
    if from_file {
        info!("Loaded configuration from: {}", path.display());
    } else {
        warn!("Config file not found, using defaults: {}", path.display());
    }

    let result = match cli.command {
        Commands::Cache(args) => cmd_cache(args, &config).await,
        Commands::Config(args) => cmd_config(args, &config, &path, from_file),
        Commands::Plan(args) => cmd_plan(args, &config).await,
    };

    if let Err(err) = &result {
        error!("Command failed: {:#}", err);
    }
    result
}
