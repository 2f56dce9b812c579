//! Cache id handling.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::Mutex;

/// Longest id that is used verbatim as a file name.
pub const MAX_CACHE_ID_LEN: usize = 200;

const HASH_SUFFIX_LEN: usize = 16;

/// Make `raw` safe for use as a file name.
///
/// Characters outside `[A-Za-z0-9._-]` become `-`. Ids longer than
/// [`MAX_CACHE_ID_LEN`] are truncated and suffixed with a hash of the original
/// so distinct long ids stay distinct.
pub fn sanitize_cache_id(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();

    if cleaned.len() <= MAX_CACHE_ID_LEN {
        return cleaned;
    }

    let hash = blake3::hash(raw.as_bytes()).to_hex();
    let keep = MAX_CACHE_ID_LEN - HASH_SUFFIX_LEN - 1;
    format!("{}-{}", &cleaned[..keep], &hash.as_str()[..HASH_SUFFIX_LEN])
}

/// Hands out numbered cache ids per calling file, so several drivers created
/// from the same test file get distinct caches.
#[derive(Debug, Default)]
pub struct CacheIdGenerator {
    counters: Mutex<HashMap<String, usize>>,
}

impl CacheIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// `<file stem>-<n>`, with `n` starting at 1 for each file.
    pub fn next(&self, file: impl AsRef<Path>) -> String {
        let file = file.as_ref();
        let stem = file
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.split('.').next().unwrap_or(name))
            .filter(|stem| !stem.is_empty())
            .unwrap_or("default");
        let mut counters = self.counters.lock();
        let counter = counters.entry(file.to_string_lossy().into_owned()).or_insert(0);
        *counter += 1;
        sanitize_cache_id(&format!("{stem}-{counter}"))
    }
}
