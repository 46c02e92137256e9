/// Live scan counters, polled by the UI without synchronising with the scan.
///
/// Counts are plain atomics. The current path is behind a mutex that
/// writers only `try_lock`, so a busy reader never stalls a worker; at
/// worst a path update is skipped.
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ScanProgress {
    files_found: AtomicU64,
    dirs_found: AtomicU64,
    total_size: AtomicU64,
    dropped_items: AtomicU64,
    active: AtomicBool,
    current_path: Mutex<Option<PathBuf>>,
}

/// A point-in-time copy of [`ScanProgress`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub files_found: u64,
    pub dirs_found: u64,
    pub total_size: u64,
    /// Items the collectors never saw because their queue was full.
    pub dropped_items: u64,
    pub active: bool,
    pub current_path: Option<PathBuf>,
}

impl ScanProgress {
    /// Zero every counter and mark the scan active.
    pub fn begin(&self, root: &Path) {
        self.files_found.store(0, Ordering::Relaxed);
        self.dirs_found.store(0, Ordering::Relaxed);
        self.total_size.store(0, Ordering::Relaxed);
        self.dropped_items.store(0, Ordering::Relaxed);
        *self.current_path.lock() = Some(root.to_path_buf());
        self.active.store(true, Ordering::Release);
    }

    pub fn finish(&self) {
        self.active.store(false, Ordering::Release);
        *self.current_path.lock() = None;
    }

    #[inline]
    pub fn add_file(&self, bytes: u64) {
        self.files_found.fetch_add(1, Ordering::Relaxed);
        self.total_size.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_bytes(&self, bytes: u64) {
        self.total_size.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_dropped(&self, count: u64) {
        self.dropped_items.fetch_add(count, Ordering::Relaxed);
    }

    /// Count a directory and make it the displayed current path.
    pub fn enter_dir(&self, dir: &Path) {
        self.dirs_found.fetch_add(1, Ordering::Relaxed);
        if let Some(mut current) = self.current_path.try_lock() {
            *current = Some(dir.to_path_buf());
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            files_found: self.files_found.load(Ordering::Relaxed),
            dirs_found: self.dirs_found.load(Ordering::Relaxed),
            total_size: self.total_size.load(Ordering::Relaxed),
            dropped_items: self.dropped_items.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Acquire),
            current_path: self.current_path.lock().clone(),
        }
    }
}

/// Per-scan control block shared between a scan and whoever drives it.
#[derive(Debug, Default)]
pub struct ScanControl {
    pub progress: ScanProgress,
    cancel: AtomicBool,
}

impl ScanControl {
    /// Request the scan to stop as soon as possible.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub(crate) fn cancel_flag(&self) -> &AtomicBool {
        &self.cancel
    }
}
