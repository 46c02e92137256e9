/// DiskCache: one persisted scan result per absolute path.
///
/// Each result lives in `<dir>/<key>.bin`, where `key` is the hex form of
/// the first 64 bits of SHA-256 over the path. Files are bincode-encoded
/// [`CacheEntry`] values written to a temp name and renamed into place.
///
/// A read never fails: undecodable files are renamed to `*.corrupt` and
/// reported as [`CacheLookup::Corrupt`]; entries whose directory changed
/// since the scan (beyond a grace window) or that are older than the
/// maximum age are [`CacheLookup::Stale`]. Nothing is swept eagerly.
use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::model::{DirEntry, FileEntry, ScanResult};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Bumped whenever the layout of [`CacheEntry`] changes.
pub const CACHE_VERSION: u32 = 1;

/// A persisted scan result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub version: u32,
    pub entries: Vec<DirEntry>,
    pub large_files: Vec<FileEntry>,
    pub total_size: u64,
    pub total_files: u64,
    /// Modification time of the scanned directory when the scan started.
    pub dir_mod_time: DateTime<Utc>,
    /// Wall-clock time the scan finished.
    pub scanned_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(result: &ScanResult, dir_mod_time: DateTime<Utc>, scanned_at: DateTime<Utc>) -> Self {
        Self {
            version: CACHE_VERSION,
            entries: result.entries.clone(),
            large_files: result.large_files.clone(),
            total_size: result.total_size,
            total_files: result.total_files,
            dir_mod_time,
            scanned_at,
        }
    }

    pub fn into_result(self) -> ScanResult {
        ScanResult {
            entries: self.entries,
            large_files: self.large_files,
            total_size: self.total_size,
            total_files: self.total_files,
        }
    }

    /// Is this entry still usable given the directory's live mtime?
    pub fn is_fresh(
        &self,
        live_mod_time: DateTime<Utc>,
        now: DateTime<Utc>,
        grace: Duration,
        max_age: Duration,
    ) -> bool {
        if self.version != CACHE_VERSION {
            return false;
        }
        let grace = chrono::Duration::from_std(grace).unwrap_or(chrono::Duration::MAX);
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let modified_since = self
            .dir_mod_time
            .checked_add_signed(grace)
            .is_some_and(|limit| live_mod_time > limit);
        !modified_since && now.signed_duration_since(self.scanned_at) <= max_age
    }
}

/// Outcome of a cache read.
#[derive(Debug)]
pub enum CacheLookup {
    Hit(CacheEntry),
    Miss,
    Stale,
    Corrupt,
}

impl CacheLookup {
    pub fn hit(self) -> Option<CacheEntry> {
        match self {
            CacheLookup::Hit(entry) => Some(entry),
            _ => None,
        }
    }
}

/// Stable cache key for an absolute path.
pub fn cache_key(path: &Path) -> String {
    let digest = Sha256::digest(path.to_string_lossy().as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    format!("{:016x}", u64::from_be_bytes(prefix))
}

/// Live modification time of `path`, if it can be read.
pub fn mod_time(path: &Path) -> Option<DateTime<Utc>> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

pub struct DiskCache {
    dir: PathBuf,
    max_age: Duration,
    grace: Duration,
    lock: Mutex<()>,
}

impl DiskCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            dir: config.dir.clone(),
            max_age: config.max_age,
            grace: config.mod_time_grace,
            lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that holds the entry for `path`.
    pub fn file_for(&self, path: &Path) -> PathBuf {
        self.dir.join(format!("{}.bin", cache_key(path)))
    }

    /// Look up `path`, validating against its live mtime and the clock.
    pub fn load(&self, path: &Path) -> CacheLookup {
        self.load_at(path, Utc::now())
    }

    pub fn load_at(&self, path: &Path, now: DateTime<Utc>) -> CacheLookup {
        let file = self.file_for(path);
        let _guard = self.lock.lock();

        let bytes = match fs::read(&file) {
            Ok(bytes) => bytes,
            Err(_) => return CacheLookup::Miss,
        };
        let entry: CacheEntry = match bincode::deserialize(&bytes) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Corrupt cache entry; quarantining");
                quarantine(&file);
                return CacheLookup::Corrupt;
            }
        };

        let Some(live) = mod_time(path) else {
            debug!(path = %path.display(), "Cached directory no longer readable");
            return CacheLookup::Miss;
        };
        if entry.is_fresh(live, now, self.grace, self.max_age) {
            CacheLookup::Hit(entry)
        } else {
            debug!(path = %path.display(), "Cache entry stale");
            CacheLookup::Stale
        }
    }

    /// Persist `entry` for `path`, replacing any previous one atomically.
    pub fn store(&self, path: &Path, entry: &CacheEntry) -> Result<(), CacheError> {
        let bytes = bincode::serialize(entry)?;
        let file = self.file_for(path);
        let _guard = self.lock.lock();
        fs::create_dir_all(&self.dir)?;
        write_atomically(&file, &bytes)?;
        Ok(())
    }

    /// Drop the entry for `path`. Returns whether one existed.
    pub fn remove(&self, path: &Path) -> Result<bool, CacheError> {
        let file = self.file_for(path);
        let _guard = self.lock.lock();
        match fs::remove_file(&file) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

/// Write `bytes` to a sibling temp file, flush, then rename over `target`.
pub(crate) fn write_atomically(target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = target.with_file_name(format!("{file_name}.{}.tmp", std::process::id()));
    let result = (|| {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
        fs::rename(&tmp, target)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Move an unreadable file aside so it can be inspected later.
pub(crate) fn quarantine(file: &Path) {
    let mut aside = file.as_os_str().to_owned();
    aside.push(".corrupt");
    if let Err(err) = fs::rename(file, PathBuf::from(aside)) {
        warn!(file = %file.display(), error = %err, "Could not quarantine corrupt cache file");
    }
}
