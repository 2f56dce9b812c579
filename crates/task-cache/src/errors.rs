use std::io;

use thiserror::Error;

/// Errors from loading or writing a cache file.
///
/// [`crate::TaskCache`] never surfaces these from lookups or saves; they are
/// logged and the cache degrades to empty. Maintenance tooling gets them
/// directly.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache file I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("cache file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("cache file written by tool version {found} predates the lowest supported version {lowest}")]
    UnsupportedVersion { found: String, lowest: String },

    #[error("invalid cache id: {0}")]
    InvalidCacheId(String),

    #[error("cache file belongs to cache id {found}, expected {expected}")]
    CacheIdMismatch { expected: String, found: String },
}

impl CacheError {
    /// Whether the file should be treated as a cold cache rather than retried.
    pub fn discards_file(&self) -> bool {
        !matches!(self, CacheError::Io(_))
    }
}
