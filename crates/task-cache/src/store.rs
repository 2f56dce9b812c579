//! The cache store: one file, its in-memory index and the occurrence
//! counters of the run that owns it.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::CacheError;
use crate::fs::{cache_file_path, load_cache_file, write_cache_file};
use crate::id::sanitize_cache_id;
use crate::model::{CacheFile, CacheKind, CacheRecord};

/// How cached results are used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheStrategy {
    /// Replay hits and persist new records.
    #[default]
    ReadWrite,
    /// Replay hits; new records stay in memory until an explicit flush.
    ReadOnly,
    /// Never replay; persist fresh records over old ones.
    WriteOnly,
}

impl CacheStrategy {
    pub fn reads(&self) -> bool {
        !matches!(self, CacheStrategy::WriteOnly)
    }

    pub fn writes(&self) -> bool {
        !matches!(self, CacheStrategy::ReadOnly)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    pub dir: Option<PathBuf>,
    pub strategy: CacheStrategy,
    pub package_name: String,
    pub package_version: String,
}

impl CacheOptions {
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            ..Default::default()
        }
    }

    pub fn with_strategy(mut self, strategy: CacheStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_package(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.package_name = name.into();
        self.package_version = version.into();
        self
    }
}

/// Result of [`TaskCache::lookup`]. The rank is claimed whether or not a
/// record was found.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheLookup {
    pub rank: usize,
    pub record: Option<CacheRecord>,
}

impl CacheLookup {
    pub fn is_hit(&self) -> bool {
        self.record.is_some()
    }

    pub fn xpaths(&self) -> Option<&[String]> {
        self.record.as_ref().and_then(CacheRecord::xpaths)
    }
}

#[derive(Debug, Default)]
struct CacheMetrics {
    lookups: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    write_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatsSnapshot {
    pub lookups: u64,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub write_failures: u64,
}

type OccurrenceKey = (CacheKind, String);

#[derive(Debug)]
struct CacheState {
    file: CacheFile,
    /// Ranks claimed so far per kind and prompt.
    occurrences: HashMap<OccurrenceKey, usize>,
    /// Rank claimed by the latest lookup and not yet written by a save.
    pending: HashMap<OccurrenceKey, usize>,
    /// Groups already handed out per kind.
    used: HashSet<(CacheKind, usize)>,
}

impl CacheState {
    fn claim(&mut self, key: &OccurrenceKey) -> usize {
        let counter = self.occurrences.entry(key.clone()).or_insert(0);
        let rank = *counter;
        *counter += 1;
        rank
    }
}

/// Per-run cache store.
///
/// The Nth lookup of a prompt reads the Nth group stored for that prompt, and
/// a save after it writes to the same group. Counters live only as long as
/// this value; the file keeps the grouping they produced.
#[derive(Debug)]
pub struct TaskCache {
    cache_id: String,
    path: Option<PathBuf>,
    strategy: CacheStrategy,
    state: Mutex<CacheState>,
    metrics: CacheMetrics,
}

impl TaskCache {
    /// Open (or start) the cache for `cache_id`.
    ///
    /// Unreadable, corrupt or outdated files are logged and replaced by an
    /// empty cache. Only an empty id is an error.
    pub fn open(cache_id: &str, options: CacheOptions) -> Result<Self, CacheError> {
        let cache_id = sanitize_cache_id(cache_id);
        if cache_id.is_empty() {
            return Err(CacheError::InvalidCacheId(
                "cache id must not be empty".to_string(),
            ));
        }
        let path = options
            .dir
            .as_deref()
            .map(|dir| cache_file_path(dir, &cache_id));

        let loaded = match &path {
            Some(path) => match load_cache_file(path, &cache_id) {
                Ok(Some(file)) => {
                    info!(
                        cache_id = %cache_id,
                        groups = file.prompt_groups.len(),
                        path = %path.display(),
                        "loaded task cache"
                    );
                    Some(file)
                }
                Ok(None) => {
                    debug!(cache_id = %cache_id, path = %path.display(), "no cache file yet");
                    None
                }
                Err(err) => {
                    warn!(
                        cache_id = %cache_id,
                        path = %path.display(),
                        error = %err,
                        "discarding unusable cache file"
                    );
                    None
                }
            },
            None => None,
        };

        let mut file = loaded.unwrap_or_else(|| {
            CacheFile::new(
                cache_id.clone(),
                options.package_name.clone(),
                options.package_version.clone(),
            )
        });
        file.tool_version = crate::TOOL_VERSION.to_string();
        if !options.package_name.is_empty() {
            file.package_name = options.package_name;
            file.package_version = options.package_version;
        }

        Ok(Self {
            cache_id,
            path,
            strategy: options.strategy,
            state: Mutex::new(CacheState {
                file,
                occurrences: HashMap::new(),
                pending: HashMap::new(),
                used: HashSet::new(),
            }),
            metrics: CacheMetrics::default(),
        })
    }

    /// A cache that is never persisted.
    pub fn in_memory(cache_id: &str) -> Result<Self, CacheError> {
        Self::open(cache_id, CacheOptions::default())
    }

    pub fn cache_id(&self) -> &str {
        &self.cache_id
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn strategy(&self) -> CacheStrategy {
        self.strategy
    }

    /// Claim the next occurrence of `(kind, prompt)` and return its record.
    pub fn lookup(&self, kind: CacheKind, prompt: &str) -> CacheLookup {
        let key = (kind, prompt.to_string());
        let mut state = self.state.lock();
        let rank = state.claim(&key);
        state.pending.insert(key, rank);
        self.metrics.lookups.fetch_add(1, Ordering::Relaxed);

        let group_index = state.file.group_indices(prompt).get(rank).copied();
        let record = if self.strategy.reads() {
            group_index.and_then(|index| {
                state.file.prompt_groups[index].record(kind).cloned()
            })
        } else {
            None
        };

        match (record, group_index) {
            (Some(record), Some(index)) => {
                state.used.insert((kind, index));
                let group = &mut state.file.prompt_groups[index];
                group.used_count = group.used_count.saturating_add(1);
                self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                debug!(kind = %kind, prompt, rank, group = index, "cache hit");
                CacheLookup {
                    rank,
                    record: Some(record),
                }
            }
            _ => {
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                debug!(kind = %kind, prompt, rank, "cache miss");
                CacheLookup { rank, record: None }
            }
        }
    }

    /// Store `record` for the current occurrence of its prompt and persist.
    ///
    /// Returns `false` when the record was rejected (empty xpaths). Write
    /// failures are logged, never returned.
    pub fn save(&self, record: CacheRecord) -> bool {
        if record.is_empty() {
            debug!(prompt = record.prompt(), "refusing to cache an empty record");
            return false;
        }
        let kind = record.kind();
        let prompt = record.prompt().to_string();
        let key = (kind, prompt.clone());

        let mut state = self.state.lock();
        let rank = match state.pending.remove(&key) {
            Some(rank) => rank,
            None => state.claim(&key),
        };
        let index = state.file.group_for_rank(&prompt, rank);
        state.file.prompt_groups[index].upsert(record);
        state.used.insert((kind, index));
        debug!(kind = %kind, prompt = %prompt, rank, group = index, "cache record saved");

        if self.strategy.writes() {
            self.persist(&state.file);
        }
        true
    }

    /// Write the current contents regardless of strategy.
    pub fn flush(&self) -> Result<(), CacheError> {
        let state = self.state.lock();
        match &self.path {
            Some(path) => write_cache_file(path, &state.file),
            None => Ok(()),
        }
    }

    /// Whether the group holding occurrence `rank` of `prompt` was handed out
    /// for `kind` during this run.
    pub fn is_used(&self, kind: CacheKind, prompt: &str, rank: usize) -> bool {
        let state = self.state.lock();
        state
            .file
            .group_indices(prompt)
            .get(rank)
            .map(|index| state.used.contains(&(kind, *index)))
            .unwrap_or(false)
    }

    /// Copy of the in-memory document.
    pub fn snapshot(&self) -> CacheFile {
        self.state.lock().file.clone()
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            lookups: self.metrics.lookups.load(Ordering::Relaxed),
            hits: self.metrics.hits.load(Ordering::Relaxed),
            misses: self.metrics.misses.load(Ordering::Relaxed),
            writes: self.metrics.writes.load(Ordering::Relaxed),
            write_failures: self.metrics.write_failures.load(Ordering::Relaxed),
        }
    }

    fn persist(&self, file: &CacheFile) {
        let Some(path) = &self.path else {
            return;
        };
        match write_cache_file(path, file) {
            Ok(()) => {
                self.metrics.writes.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                self.metrics.write_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    cache_id = %self.cache_id,
                    path = %path.display(),
                    error = %err,
                    "task cache persist failed"
                );
            }
        }
    }
}
