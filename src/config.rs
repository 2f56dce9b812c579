//! Tapline configuration: YAML file, lookup order and environment overrides.

use std::env;
use std::path::{Path, PathBuf};

use agent_core::DriverConfig;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use task_cache::{CacheOptions, CacheStrategy, SharedTaskCache, TaskCache};
use tracing::warn;

pub const ENV_RUN_DIR: &str = "TAPLINE_RUN_DIR";
pub const ENV_CACHE: &str = "TAPLINE_CACHE";
pub const ENV_REPLANNING_CYCLE_LIMIT: &str = "TAPLINE_REPLANNING_CYCLE_LIMIT";
pub const ENV_LOG_LEVEL: &str = "TAPLINE_LOG_LEVEL";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaplineConfig {
    pub cache: CacheConfig,
    pub driver: DriverConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub strategy: CacheStrategy,
    /// Cache files live in `<run_dir>/cache`.
    pub run_dir: PathBuf,
    pub package_name: String,
    pub package_version: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: CacheStrategy::ReadWrite,
            run_dir: PathBuf::from("tapline_run"),
            package_name: String::new(),
            package_version: String::new(),
        }
    }
}

impl CacheConfig {
    pub fn cache_dir(&self) -> PathBuf {
        self.run_dir.join("cache")
    }

    pub fn options(&self) -> CacheOptions {
        CacheOptions::in_dir(self.cache_dir())
            .with_strategy(self.strategy)
            .with_package(&self.package_name, &self.package_version)
    }

    /// `None` when caching is disabled or the id is unusable.
    pub fn open(&self, cache_id: &str) -> Option<SharedTaskCache> {
        if !self.enabled {
            return None;
        }
        match TaskCache::open(cache_id, self.options()) {
            Ok(cache) => Some(std::sync::Arc::new(cache)),
            Err(err) => {
                warn!(cache_id, error = %err, "cannot open cache; running without one");
                None
            }
        }
    }

    /// Applies a `TAPLINE_CACHE` style mode string.
    pub fn apply_mode(&mut self, mode: &str) -> Result<()> {
        match mode.trim().to_ascii_lowercase().as_str() {
            "off" | "false" | "0" => self.enabled = false,
            "read-write" | "true" | "1" => {
                self.enabled = true;
                self.strategy = CacheStrategy::ReadWrite;
            }
            "read-only" => {
                self.enabled = true;
                self.strategy = CacheStrategy::ReadOnly;
            }
            "write-only" => {
                self.enabled = true;
                self.strategy = CacheStrategy::WriteOnly;
            }
            other => bail!(
                "unknown cache mode '{other}' (expected read-write, read-only, write-only or off)"
            ),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    /// Adds a daily-rolling file log when set.
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            log_dir: None,
        }
    }
}

/// Loading happens before the subscriber is installed, so the caller logs
/// where the config came from.
pub struct LoadedConfig {
    pub config: TaplineConfig,
    pub path: PathBuf,
    /// Whether `path` existed and was read.
    pub from_file: bool,
}

/// Where to look when no `--config` is given, in priority order.
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("config/tapline.yaml")];
    if let Some(mut path) = dirs::config_dir() {
        path.push("tapline");
        path.push("config.yaml");
        paths.push(path);
    }
    paths
}

pub fn load_config(config_path: Option<&Path>) -> Result<LoadedConfig> {
    let candidates = match config_path {
        Some(path) => vec![path.to_path_buf()],
        None => default_config_paths(),
    };
    let found = candidates.iter().find(|path| path.exists()).cloned();

    let mut loaded = match found {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config: TaplineConfig = serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;
            LoadedConfig {
                config,
                path,
                from_file: true,
            }
        }
        None => {
            if let Some(path) = config_path {
                bail!("Config file not found: {}", path.display());
            }
            let path = candidates.first().cloned().unwrap_or_default();
            LoadedConfig {
                config: TaplineConfig::default(),
                path,
                from_file: false,
            }
        }
    };

    apply_env_overrides(&mut loaded.config)?;
    Ok(loaded)
}

pub fn apply_env_overrides(config: &mut TaplineConfig) -> Result<()> {
    if let Ok(run_dir) = env::var(ENV_RUN_DIR) {
        if !run_dir.trim().is_empty() {
            config.cache.run_dir = PathBuf::from(run_dir);
        }
    }
    if let Ok(mode) = env::var(ENV_CACHE) {
        config
            .cache
            .apply_mode(&mode)
            .with_context(|| format!("Invalid {ENV_CACHE}"))?;
    }
    if let Ok(limit) = env::var(ENV_REPLANNING_CYCLE_LIMIT) {
        config.driver.replanning_cycle_limit = limit
            .trim()
            .parse()
            .with_context(|| format!("Invalid {ENV_REPLANNING_CYCLE_LIMIT}: {limit}"))?;
    }
    if let Ok(level) = env::var(ENV_LOG_LEVEL) {
        if !level.trim().is_empty() {
            config.logging.level = level.trim().to_string();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [ENV_RUN_DIR, ENV_CACHE, ENV_REPLANNING_CYCLE_LIMIT, ENV_LOG_LEVEL] {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn explicit_file_is_read() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tapline.yaml");
        std::fs::write(
            &path,
            "cache:\n  strategy: read-only\n  run_dir: /tmp/runs\ndriver:\n  replanning_cycle_limit: 4\n",
        )
        .unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert!(loaded.from_file);
        assert_eq!(loaded.config.cache.strategy, CacheStrategy::ReadOnly);
        assert_eq!(loaded.config.cache.cache_dir(), PathBuf::from("/tmp/runs/cache"));
        assert_eq!(loaded.config.driver.replanning_cycle_limit, 4);
        assert_eq!(loaded.config.driver.wait_for_timeout_ms, 15_000);
        assert_eq!(loaded.config.logging.level, "info");
    }

    #[test]
    #[serial]
    fn missing_explicit_file_is_an_error() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("nope.yaml"))).is_err());
    }

    #[test]
    #[serial]
    fn env_overrides_win() {
        clear_env();
        env::set_var(ENV_RUN_DIR, "/srv/tapline");
        env::set_var(ENV_CACHE, "write-only");
        env::set_var(ENV_REPLANNING_CYCLE_LIMIT, "7");
        env::set_var(ENV_LOG_LEVEL, "debug");

        let mut config = TaplineConfig::default();
        apply_env_overrides(&mut config).unwrap();
        clear_env();

        assert_eq!(config.cache.run_dir, PathBuf::from("/srv/tapline"));
        assert_eq!(config.cache.strategy, CacheStrategy::WriteOnly);
        assert!(config.cache.enabled);
        assert_eq!(config.driver.replanning_cycle_limit, 7);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    #[serial]
    fn cache_off_and_bad_values() {
        clear_env();
        let mut config = TaplineConfig::default();
        env::set_var(ENV_CACHE, "off");
        apply_env_overrides(&mut config).unwrap();
        assert!(!config.cache.enabled);
        assert!(config.cache.open("anything").is_none());

        env::set_var(ENV_CACHE, "sometimes");
        assert!(apply_env_overrides(&mut config).is_err());
        clear_env();

        env::set_var(ENV_REPLANNING_CYCLE_LIMIT, "ten");
        assert!(apply_env_overrides(&mut config).is_err());
        clear_env();
    }

    #[test]
    fn config_round_trips_through_yaml() {
        let config = TaplineConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("replanning_cycle_limit: 10"));
        let parsed: TaplineConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }
}
