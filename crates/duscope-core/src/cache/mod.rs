/// Persistent caches: the per-path [`DiskCache`] and the coarse
/// [`OverviewStore`], bundled so the scanner owns both through one handle.
pub mod disk;
pub mod overview;

pub use disk::{cache_key, CacheEntry, CacheLookup, DiskCache};
pub use overview::{OverviewSnapshot, OverviewStore, PrefetchOutcome};

use crate::config::CacheConfig;
use std::path::Path;
use tracing::{debug, warn};

pub struct ScanCaches {
    pub disk: DiskCache,
    pub overview: OverviewStore,
}

impl ScanCaches {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            disk: DiskCache::new(config),
            overview: OverviewStore::new(&config.dir, config.overview_ttl),
        }
    }

    /// Forget everything cached about `path` and its ancestors.
    ///
    /// Called after content under `path` was deleted or changed. Ancestors
    /// are included because their totals contain `path` even when their
    /// own mtime did not move.
    pub fn invalidate(&self, path: &Path) {
        for target in path.ancestors() {
            match self.disk.remove(target) {
                Ok(true) => debug!(path = %target.display(), "Scan cache entry invalidated"),
                Ok(false) => {}
                Err(err) => warn!(path = %target.display(), error = %err, "Failed to drop scan cache entry"),
            }
            match self.overview.remove(target) {
                Ok(true) => debug!(path = %target.display(), "Overview size invalidated"),
                Ok(false) => {}
                Err(err) => warn!(path = %target.display(), error = %err, "Failed to drop overview size"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScanResult;
    use chrono::Utc;

    #[test]
    fn invalidate_drops_both_tiers_for_path_and_ancestors() {
        let scanned = tempfile::TempDir::new().unwrap();
        let store = tempfile::TempDir::new().unwrap();
        let caches = ScanCaches::new(&CacheConfig::in_dir(store.path()));

        let child = scanned.path().join("child");
        std::fs::create_dir(&child).unwrap();
        for dir in [scanned.path(), child.as_path()] {
            let entry = CacheEntry::new(
                &ScanResult::default(),
                disk::mod_time(dir).unwrap(),
                Utc::now(),
            );
            caches.disk.store(dir, &entry).unwrap();
        }
        caches.overview.put(scanned.path(), 7).unwrap();

        caches.invalidate(&child);

        assert!(matches!(caches.disk.load(&child), CacheLookup::Miss));
        assert!(matches!(caches.disk.load(scanned.path()), CacheLookup::Miss));
        assert_eq!(caches.overview.get(scanned.path()), None);
    }
}
