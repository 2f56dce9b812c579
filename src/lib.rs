//! Tapline command line and runtime wiring.
//!
//! The engine lives in the workspace crates; this crate loads configuration,
//! installs logging and exposes cache maintenance commands.

pub mod cli;
pub mod config;
pub mod runtime;

pub use config::{load_config, CacheConfig, LoadedConfig, LogFormat, LoggingConfig, TaplineConfig};
pub use runtime::init_logging;
