use std::path::Path;

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::config::TaplineConfig;

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration, after env and flag overrides
    Show,

    /// Print the default configuration
    Defaults,
}

pub fn cmd_config(
    args: ConfigArgs,
    config: &TaplineConfig,
    path: &Path,
    from_file: bool,
) -> Result<()> {
    match args.action {
        ConfigAction::Show => {
            if from_file {
                println!("Current configuration ({}):", path.display());
            } else {
                println!("Current configuration (defaults):");
            }
            println!("{}", serde_yaml::to_string(config)?);
        }
        ConfigAction::Defaults => {
            println!("{}", serde_yaml::to_string(&TaplineConfig::default())?);
        }
    }
    Ok(())
}
