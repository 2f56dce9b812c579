use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use super::cache::CacheArgs;
use super::config::ConfigArgs;
use super::plan::PlanArgs;
use crate::config::{LogFormat, TaplineConfig};

#[derive(Parser, Debug)]
#[command(name = "tapline", author, version, long_version = crate::runtime::long_version(), about, long_about = None)]
#[command(propagate_version = true)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (overrides the config file)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Run directory; cache files live in `<run-dir>/cache`
    #[arg(long, value_name = "DIR", global = true)]
    pub run_dir: Option<PathBuf>,

    /// Planning rounds allowed per instruction
    #[arg(long, global = true)]
    pub replanning_cycle_limit: Option<u32>,

    /// Default wait-for timeout, e.g. `15s`
    #[arg(long, value_parser = humantime::parse_duration, global = true)]
    pub wait_for_timeout: Option<Duration>,

    /// Default wait-for check interval, e.g. `3s`
    #[arg(long, value_parser = humantime::parse_duration, global = true)]
    pub wait_for_interval: Option<Duration>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inspect and maintain cache files
    Cache(CacheArgs),

    /// Show the effective configuration
    Config(ConfigArgs),

    /// Check plan files against the built-in actions
    Plan(PlanArgs),
}

impl CliArgs {
    /// Flags win over the config file and the environment.
    pub fn apply(&self, config: &mut TaplineConfig) {
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.json_logs {
            config.logging.format = LogFormat::Json;
        }
        if let Some(run_dir) = &self.run_dir {
            config.cache.run_dir = run_dir.clone();
        }
        if let Some(limit) = self.replanning_cycle_limit {
            config.driver.replanning_cycle_limit = limit;
        }
        if let Some(timeout) = self.wait_for_timeout {
            config.driver.wait_for_timeout_ms = duration_ms(timeout);
        }
        if let Some(interval) = self.wait_for_interval {
            config.driver.wait_for_check_interval_ms = duration_ms(interval);
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn flags_override_config() {
        let cli = CliArgs::parse_from([
            "tapline",
            "--run-dir",
            "/tmp/run",
            "--json-logs",
            "--wait-for-timeout",
            "2m",
            "--wait-for-interval",
            "1500ms",
            "--replanning-cycle-limit",
            "3",
            "config",
            "show",
        ]);
        let mut config = TaplineConfig::default();
        cli.apply(&mut config);

        assert_eq!(config.cache.run_dir, PathBuf::from("/tmp/run"));
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.driver.wait_for_timeout_ms, 120_000);
        assert_eq!(config.driver.wait_for_check_interval_ms, 1_500);
        assert_eq!(config.driver.replanning_cycle_limit, 3);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn rejects_bad_durations() {
        let parsed = CliArgs::try_parse_from([
            "tapline",
            "--wait-for-timeout",
            "soon",
            "config",
            "show",
        ]);
        assert!(parsed.is_err());
    }
}
