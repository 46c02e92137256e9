/// OverviewStore: coarse, TTL-bounded sizes for a few top-level paths.
///
/// The whole store is one JSON object mapping path to [`OverviewSnapshot`],
/// loaded lazily on first access. A single mutex covers the load, the
/// mutation and the write-back, so a `put` is never interleaved with
/// another `put` half-way through persisting.
use crate::cache::disk::{quarantine, write_atomically};
use crate::error::CacheError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// File name of the store inside the cache directory.
pub const OVERVIEW_FILE: &str = "overview.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverviewSnapshot {
    pub size: u64,
    pub updated: DateTime<Utc>,
}

impl OverviewSnapshot {
    fn is_live(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        now.signed_duration_since(self.updated) < ttl
    }
}

type SnapshotMap = HashMap<String, OverviewSnapshot>;

/// Counts reported by [`OverviewStore::prefetch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefetchOutcome {
    /// Paths measured and stored.
    pub measured: usize,
    /// Paths that already had a live snapshot.
    pub fresh: usize,
    /// Paths whose measurement failed.
    pub failed: usize,
    /// `true` if the cancel flag stopped the run early.
    pub cancelled: bool,
}

pub struct OverviewStore {
    file: PathBuf,
    ttl: Duration,
    state: Mutex<Option<SnapshotMap>>,
}

fn key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl OverviewStore {
    pub fn new(dir: &Path, ttl: Duration) -> Self {
        Self {
            file: dir.join(OVERVIEW_FILE),
            ttl,
            state: Mutex::new(None),
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Run `f` on the hydrated map while holding the store lock.
    fn with_map<R>(&self, f: impl FnOnce(&mut SnapshotMap) -> R) -> R {
        let mut state = self.state.lock();
        let map = state.get_or_insert_with(|| load_map(&self.file));
        f(map)
    }

    /// Cached size of `path` if it is younger than the TTL.
    pub fn get(&self, path: &Path) -> Option<u64> {
        self.get_at(path, Utc::now())
    }

    pub fn get_at(&self, path: &Path, now: DateTime<Utc>) -> Option<u64> {
        let ttl = self.ttl;
        self.with_map(|map| {
            map.get(&key(path))
                .filter(|snap| snap.is_live(now, ttl))
                .map(|snap| snap.size)
        })
    }

    /// Record a fresh size for `path` and persist the store.
    pub fn put(&self, path: &Path, size: u64) -> Result<(), CacheError> {
        self.put_at(path, size, Utc::now())
    }

    pub fn put_at(&self, path: &Path, size: u64, now: DateTime<Utc>) -> Result<(), CacheError> {
        let file = &self.file;
        self.with_map(|map| {
            map.insert(key(path), OverviewSnapshot { size, updated: now });
            persist(file, map)
        })
    }

    /// Forget `path`. Returns whether it was present.
    pub fn remove(&self, path: &Path) -> Result<bool, CacheError> {
        let file = &self.file;
        self.with_map(|map| {
            if map.remove(&key(path)).is_none() {
                return Ok(false);
            }
            persist(file, map)?;
            Ok(true)
        })
    }

    /// Measure every path in `paths` that lacks a live snapshot, one at a
    /// time, checking `cancel` between items.
    ///
    /// `measure` runs without the store lock held; only the final `put`
    /// takes it, so a cancelled or failed measurement leaves the store
    /// untouched.
    pub fn prefetch<F>(&self, paths: &[PathBuf], measure: F, cancel: &AtomicBool) -> PrefetchOutcome
    where
        F: Fn(&Path) -> Option<u64>,
    {
        let mut outcome = PrefetchOutcome::default();
        for path in paths {
            if cancel.load(Ordering::Relaxed) {
                outcome.cancelled = true;
                break;
            }
            if self.get(path).is_some() {
                outcome.fresh += 1;
                continue;
            }
            let Some(size) = measure(path) else {
                outcome.failed += 1;
                continue;
            };
            if cancel.load(Ordering::Relaxed) {
                outcome.cancelled = true;
                break;
            }
            match self.put(path, size) {
                Ok(()) => outcome.measured += 1,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Failed to persist overview size");
                    outcome.failed += 1;
                }
            }
        }
        info!(?outcome, "Overview prefetch finished");
        outcome
    }
}

fn load_map(file: &Path) -> SnapshotMap {
    let text = match fs::read_to_string(file) {
        Ok(text) => text,
        Err(_) => return SnapshotMap::new(),
    };
    match serde_json::from_str(&text) {
        Ok(map) => map,
        Err(err) => {
            warn!(file = %file.display(), error = %err, "Corrupt overview store; starting empty");
            quarantine(file);
            SnapshotMap::new()
        }
    }
}

fn persist(file: &Path, map: &SnapshotMap) -> Result<(), CacheError> {
    if let Some(dir) = file.parent() {
        fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_vec_pretty(map)?;
    write_atomically(file, &json)?;
    debug!(entries = map.len(), "Overview store persisted");
    Ok(())
}
