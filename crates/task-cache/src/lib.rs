//! Locate and plan cache for repeated runs of the same script.
//!
//! A cache file holds prompt groups. Each group is one occurrence of a literal
//! prompt: a script that says "click next" five times produces five groups
//! with that prompt. A [`TaskCache`] counts occurrences per run, so replaying
//! the script reads the groups back in the order they were written.
//!
//! Caching is best-effort. Unreadable files load as empty caches and failed
//! writes are logged, never returned.

mod errors;
pub mod fs;
mod id;
mod model;
mod store;

pub use errors::CacheError;
pub use id::{sanitize_cache_id, CacheIdGenerator, MAX_CACHE_ID_LEN};
pub use model::{CacheFile, CacheKind, CacheRecord, PageContext, PromptGroup};
pub use store::{
    CacheLookup, CacheOptions, CacheStatsSnapshot, CacheStrategy, TaskCache,
};

/// Version stamped into every file this crate writes.
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Files from older tool versions use an incompatible layout.
pub const LOWEST_SUPPORTED_TOOL_VERSION: &str = "0.1.0";

pub type SharedTaskCache = std::sync::Arc<TaskCache>;
