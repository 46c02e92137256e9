/// Scanner and cache configuration.
///
/// Every bound the engine uses is a named constant here. The structs can
/// be deserialised from JSON with any subset of fields present; missing
/// fields take the constant defaults.
use crate::platform;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Number of largest children kept in a `ScanResult`.
pub const DEFAULT_MAX_ENTRIES: usize = 30;

/// Number of largest files kept in a `ScanResult`.
pub const DEFAULT_MAX_LARGE_FILES: usize = 20;

/// Files smaller than this never enter the large-file list.
pub const DEFAULT_LARGE_FILE_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Worker pool sizing: `min(max(cpus * MULT, MIN), MAX, children)`.
pub const CPU_MULTIPLIER: usize = 4;
pub const MIN_WORKERS: usize = 16;
pub const MAX_WORKERS: usize = 64;

/// Worker threads given to a single fast walk.
pub const FAST_WALK_WORKERS: usize = 8;

/// Hard deadline for one fast walk.
pub const FAST_WALK_DEADLINE: Duration = Duration::from_secs(5 * 60);

/// Concurrently running external tool invocations.
pub const MAX_RUNNING_PROBES: usize = 8;

/// Callers allowed to wait for a probe slot before failing fast.
pub const MAX_QUEUED_PROBES: usize = 32;

/// Timeout for one `du` invocation.
pub const DU_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for one content-search invocation.
pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of the entry and large-file queues feeding the collectors.
pub const QUEUE_CAPACITY: usize = 1_024;

/// How long a producer waits on a full queue before dropping the item.
pub const QUEUE_SEND_TIMEOUT: Duration = Duration::from_millis(100);

/// Cached results older than this are rejected.
pub const CACHE_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 3600);

/// Tolerance when comparing a cached directory mtime with the live one.
pub const CACHE_MOD_TIME_GRACE: Duration = Duration::from_secs(30 * 60);

/// Lifetime of an overview size.
pub const OVERVIEW_TTL: Duration = Duration::from_secs(60 * 60);

/// Tuning for scans.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub max_entries: usize,
    pub max_large_files: usize,
    pub large_file_threshold: u64,
    pub cpu_multiplier: usize,
    pub min_workers: usize,
    pub max_workers: usize,
    pub fast_walk_workers: usize,
    #[serde(with = "duration_secs")]
    pub fast_walk_deadline: Duration,
    pub max_running_probes: usize,
    pub max_queued_probes: usize,
    /// Disk-usage tool invoked as `<du> -skP <path>`.
    pub du_program: String,
    #[serde(with = "duration_secs")]
    pub du_timeout: Duration,
    /// Content-search tool invoked as `<search> -onlyin <root> <query>`.
    /// `None` disables the large-file supplement.
    pub search_program: Option<String>,
    #[serde(with = "duration_secs")]
    pub search_timeout: Duration,
    pub queue_capacity: usize,
    #[serde(with = "duration_millis")]
    pub queue_send_timeout: Duration,
    /// Extra directory names folded in addition to the built-in set.
    pub extra_fold_names: Vec<String>,
    /// Paths whose coarse size is kept in the overview store.
    pub overview_roots: Vec<PathBuf>,
    /// Directories that consult the overview store before being sized.
    pub known_huge_dirs: Vec<PathBuf>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            max_large_files: DEFAULT_MAX_LARGE_FILES,
            large_file_threshold: DEFAULT_LARGE_FILE_THRESHOLD,
            cpu_multiplier: CPU_MULTIPLIER,
            min_workers: MIN_WORKERS,
            max_workers: MAX_WORKERS,
            fast_walk_workers: FAST_WALK_WORKERS,
            fast_walk_deadline: FAST_WALK_DEADLINE,
            max_running_probes: MAX_RUNNING_PROBES,
            max_queued_probes: MAX_QUEUED_PROBES,
            du_program: "du".to_string(),
            du_timeout: DU_TIMEOUT,
            search_program: cfg!(target_os = "macos").then(|| "mdfind".to_string()),
            search_timeout: SEARCH_TIMEOUT,
            queue_capacity: QUEUE_CAPACITY,
            queue_send_timeout: QUEUE_SEND_TIMEOUT,
            extra_fold_names: Vec::new(),
            overview_roots: platform::overview_roots(),
            known_huge_dirs: platform::known_huge_dirs(),
        }
    }
}

impl ScanConfig {
    /// Worker count for a fan-out over `children` directories.
    ///
    /// `min(max(cpus * multiplier, min_workers), max_workers, children)`,
    /// never less than one.
    pub fn worker_count(&self, cpus: usize, children: usize) -> usize {
        (cpus * self.cpu_multiplier)
            .max(self.min_workers)
            .min(self.max_workers)
            .min(children)
            .max(1)
    }
}

/// Cache locations and validity windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: PathBuf,
    #[serde(with = "duration_secs")]
    pub max_age: Duration,
    #[serde(with = "duration_secs")]
    pub mod_time_grace: Duration,
    #[serde(with = "duration_secs")]
    pub overview_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: platform::default_cache_dir(),
            max_age: CACHE_MAX_AGE,
            mod_time_grace: CACHE_MOD_TIME_GRACE,
            overview_ttl: OVERVIEW_TTL,
        }
    }
}

impl CacheConfig {
    /// Defaults rooted at `dir`.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }
}

/// Top-level configuration file layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scan: ScanConfig,
    pub cache: CacheConfig,
}

impl Config {
    /// Load a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self, crate::error::CacheError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
