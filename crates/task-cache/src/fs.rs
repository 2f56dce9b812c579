//! Reading and writing cache files.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use semver::Version;

use crate::errors::CacheError;
use crate::model::CacheFile;
use crate::LOWEST_SUPPORTED_TOOL_VERSION;

pub const CACHE_FILE_SUFFIX: &str = ".cache.json";

/// `<dir>/<cache id>.cache.json`
pub fn cache_file_path(dir: &Path, cache_id: &str) -> PathBuf {
    dir.join(format!("{cache_id}{CACHE_FILE_SUFFIX}"))
}

/// Rejects files written by tool versions older than the lowest supported
/// schema. `beta` pre-releases are internal builds and are accepted.
pub fn check_tool_version(found: &str) -> Result<(), CacheError> {
    let unsupported = || CacheError::UnsupportedVersion {
        found: found.to_string(),
        lowest: LOWEST_SUPPORTED_TOOL_VERSION.to_string(),
    };
    let version = Version::parse(found).map_err(|_| unsupported())?;
    if version.pre.as_str().contains("beta") {
        return Ok(());
    }
    let lowest = Version::parse(LOWEST_SUPPORTED_TOOL_VERSION).map_err(|_| unsupported())?;
    if version < lowest {
        return Err(unsupported());
    }
    Ok(())
}

/// Parse a cache file without applying the version guard.
pub fn read_cache_file(path: &Path) -> Result<CacheFile, CacheError> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Load the cache for `cache_id`. `Ok(None)` when no file exists yet.
pub fn load_cache_file(path: &Path, cache_id: &str) -> Result<Option<CacheFile>, CacheError> {
    if !path.exists() {
        return Ok(None);
    }
    let file = read_cache_file(path)?;
    check_tool_version(&file.tool_version)?;
    if file.cache_id != cache_id {
        return Err(CacheError::CacheIdMismatch {
            expected: cache_id.to_string(),
            found: file.cache_id,
        });
    }
    Ok(Some(file))
}

/// Serialize the normalized file and replace `path` atomically.
pub fn write_cache_file(path: &Path, file: &CacheFile) -> Result<(), CacheError> {
    let json = serde_json::to_vec_pretty(&file.normalized())?;
    write_atomic(path, &json)?;
    Ok(())
}

fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp)?;
    file.write_all(data)?;
    file.sync_all()?;
    fs::rename(tmp, path)
}
