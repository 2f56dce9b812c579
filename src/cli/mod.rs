//! The `tapline` binary.

mod app;
mod args;
pub mod cache;
pub mod config;
pub mod plan;

pub use app::run;
pub use args::{CliArgs, Commands};
