/// Scanner module: orchestrates directory sizing.
///
/// [`Scanner::scan`] lists a root's immediate children and sizes each one:
///
/// - files and symlinks are charged their own allocated size inline;
/// - directories are dispatched to a per-scan rayon pool, where each walks
///   the provider chain chosen by [`provider::chain_for`].
///
/// Results stream into two bounded queues, each drained by one collector
/// thread into a [`crate::analysis::TopK`]. The total and file count are
/// plain atomics updated unconditionally, so a full queue only ever
/// shortens the display lists.
///
/// A finished scan is written to the disk cache, and to the overview store
/// when the root is one of the configured overview roots.
pub mod flight;
pub mod progress;
pub mod provider;
pub mod queue;
pub mod sizer;

use crate::analysis::FoldRules;
use crate::cache::disk::mod_time;
use crate::cache::{CacheEntry, PrefetchOutcome, ScanCaches};
use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::model::entry::entry_name;
use crate::model::{DirEntry, FileEntry, ScanResult};
use crate::platform::{disk_usage, last_access};
use crate::probe::SizeProbe;
use chrono::Utc;
use crossbeam_channel::Receiver;
use flight::SingleFlight;
use progress::{ProgressSnapshot, ScanControl};
use provider::{Cancelled, Measured, ScanContext, FOLDED_CHAIN};
use queue::{bounded_queue, QueueSender};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Outcome shared with every caller of a deduplicated scan.
pub type SharedScan = Result<Arc<ScanResult>, ScanError>;

impl From<Cancelled> for ScanError {
    fn from(_: Cancelled) -> Self {
        ScanError::Cancelled
    }
}

/// An immediate child of the scan root, classified once.
struct Child {
    path: PathBuf,
    kind: ChildKind,
    meta: fs::Metadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChildKind {
    File,
    Dir,
    Symlink,
}

/// Owns the configuration, fold rules, probe and caches for every scan.
///
/// Construct once at startup and share behind an `Arc`.
pub struct Scanner {
    config: ScanConfig,
    rules: FoldRules,
    probe: SizeProbe,
    caches: Arc<ScanCaches>,
    fast_pool: Option<Arc<rayon::ThreadPool>>,
    flights: SingleFlight<PathBuf, FlightOutcome>,
}

/// What one flight hands to every caller attached to it.
#[derive(Clone)]
struct FlightOutcome {
    result: SharedScan,
    /// The root was served from the disk cache without scanning.
    from_cache: bool,
}

/// Whether a caller must run a flight of its own instead of taking
/// `outcome`: it was cancelled by some other caller, or it is a cached
/// answer to a fresh request.
fn should_rejoin(outcome: &FlightOutcome, fresh: bool, self_cancelled: bool) -> bool {
    match &outcome.result {
        Err(ScanError::Cancelled) => !self_cancelled,
        Ok(_) => fresh && outcome.from_cache,
        Err(_) => false,
    }
}

/// Handle to a scan running on a background thread.
pub struct ScanHandle {
    /// Receives exactly one message: the scan outcome.
    pub result_rx: Receiver<SharedScan>,
    control: Arc<ScanControl>,
    _thread: Option<thread::JoinHandle<()>>,
}

impl ScanHandle {
    /// Request the scan to stop as soon as possible.
    pub fn cancel(&self) {
        self.control.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.is_cancelled()
    }

    /// Current counters, safe to call every frame.
    pub fn progress(&self) -> ProgressSnapshot {
        self.control.progress.snapshot()
    }

    /// Block until the scan finishes.
    pub fn wait(self) -> SharedScan {
        self.result_rx
            .recv()
            .unwrap_or_else(|_| Err(ScanError::WorkerPool("scan thread exited without a result".into())))
    }
}

impl Scanner {
    pub fn new(config: ScanConfig, caches: Arc<ScanCaches>) -> Self {
        let mut rules = FoldRules::default();
        for name in &config.extra_fold_names {
            rules = rules.with_name(name.clone());
        }
        let fast_pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(config.fast_walk_workers.max(1))
            .thread_name(|i| format!("duscope-fast-{i}"))
            .build()
        {
            Ok(pool) => Some(Arc::new(pool)),
            Err(err) => {
                warn!(error = %err, "Failed to build fast-walk pool; walks will build their own");
                None
            }
        };
        Self {
            probe: SizeProbe::new(&config),
            config,
            rules,
            caches,
            fast_pool,
            flights: SingleFlight::new(),
        }
    }

    /// Replace the folding policy.
    pub fn with_rules(mut self, rules: FoldRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn caches(&self) -> &Arc<ScanCaches> {
        &self.caches
    }

    /// Scan `root`, serving a valid cached result when there is one.
    pub fn scan(&self, root: &Path) -> SharedScan {
        self.scan_with(root, &ScanControl::default())
    }

    /// Like [`Scanner::scan`], reporting into and cancellable through `control`.
    ///
    /// Concurrent calls for one root share a single scan. Only the caller
    /// running it sees live counters; the others see their progress marked
    /// active until the shared result arrives. A caller whose shared scan
    /// was cancelled by someone else runs the scan again itself.
    pub fn scan_with(&self, root: &Path, control: &ScanControl) -> SharedScan {
        self.dispatch(root, control, false)
    }

    /// Scan `root` ignoring any cached result for the root itself. The
    /// result still replaces the cached one.
    pub fn scan_fresh(&self, root: &Path, control: &ScanControl) -> SharedScan {
        self.dispatch(root, control, true)
    }

    /// Start a scan on a background thread.
    pub fn start(self: &Arc<Self>, root: PathBuf, fresh: bool) -> ScanHandle {
        let (result_tx, result_rx) = crossbeam_channel::bounded::<SharedScan>(1);
        let control = Arc::new(ScanControl::default());
        let scanner = Arc::clone(self);
        let thread_control = Arc::clone(&control);

        let thread = thread::Builder::new()
            .name("duscope-scanner".into())
            .spawn(move || {
                let outcome = scanner.dispatch(&root, &thread_control, fresh);
                let _ = result_tx.send(outcome);
            });
        let thread = match thread {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!(error = %err, "Failed to spawn scanner thread");
                None
            }
        };

        ScanHandle {
            result_rx,
            control,
            _thread: thread,
        }
    }

    /// Forget cached sizes for `path` (and its ancestors) after the caller
    /// changed something underneath it.
    pub fn invalidate(&self, path: &Path) {
        let path = absolute(path);
        info!(path = %path.display(), "Invalidating cached sizes");
        self.caches.invalidate(&path);
    }

    /// Coarse size of `path` via probe, then fast walk. `None` if cancelled.
    pub fn measure_overview(&self, path: &Path, cancel: &AtomicBool) -> Option<u64> {
        let progress = progress::ScanProgress::default();
        let ctx = ScanContext {
            config: &self.config,
            rules: &self.rules,
            probe: &self.probe,
            caches: &self.caches,
            progress: &progress,
            cancel,
            fast_pool: self.fast_pool.as_ref(),
            files: None,
        };
        provider::measure(FOLDED_CHAIN, path, &ctx).ok().map(|m| m.bytes)
    }

    /// Fill in missing or expired overview sizes on a background thread.
    pub fn spawn_overview_prefetch(
        self: &Arc<Self>,
        cancel: Arc<AtomicBool>,
    ) -> std::io::Result<thread::JoinHandle<PrefetchOutcome>> {
        let scanner = Arc::clone(self);
        thread::Builder::new()
            .name("duscope-overview".into())
            .spawn(move || {
                let paths = scanner.config.overview_roots.clone();
                scanner.caches.overview.prefetch(
                    &paths,
                    |path| scanner.measure_overview(path, &cancel),
                    &cancel,
                )
            })
    }

    fn dispatch(&self, root: &Path, control: &ScanControl, fresh: bool) -> SharedScan {
        let root = absolute(root);
        control.progress.begin(&root);
        let result = loop {
            let outcome = self
                .flights
                .run(root.clone(), || self.scan_or_load(&root, control, fresh));
            if should_rejoin(&outcome, fresh, control.is_cancelled()) {
                debug!(path = %root.display(), "Shared scan outcome does not fit this caller; rescanning");
                continue;
            }
            break outcome.result;
        };
        control.progress.finish();
        result
    }

    fn scan_or_load(&self, root: &Path, control: &ScanControl, fresh: bool) -> FlightOutcome {
        if !fresh {
            if let Some(entry) = self.caches.disk.load(root).hit() {
                info!(path = %root.display(), "Serving scan from cache");
                let result = entry.into_result();
                control.progress.add_bytes(result.total_size);
                return FlightOutcome {
                    result: Ok(Arc::new(result)),
                    from_cache: true,
                };
            }
        }
        FlightOutcome {
            result: self.scan_and_store(root, control),
            from_cache: false,
        }
    }

    fn scan_and_store(&self, root: &Path, control: &ScanControl) -> SharedScan {
        let dir_mod_time = mod_time(root);
        let result = self.scan_children(root, control)?;

        if let Some(mtime) = dir_mod_time {
            let entry = CacheEntry::new(&result, mtime, Utc::now());
            if let Err(err) = self.caches.disk.store(root, &entry) {
                warn!(path = %root.display(), error = %err, "Failed to persist scan result");
            }
        }
        if self.config.overview_roots.iter().any(|p| p == root) {
            if let Err(err) = self.caches.overview.put(root, result.total_size) {
                warn!(path = %root.display(), error = %err, "Failed to persist overview size");
            }
        }
        Ok(Arc::new(result))
    }

    fn scan_children(&self, root: &Path, control: &ScanControl) -> Result<ScanResult, ScanError> {
        let start = Instant::now();
        info!("Starting scan of {}", root.display());

        let read_dir = fs::read_dir(root).map_err(|err| ScanError::RootUnreadable {
            path: root.to_path_buf(),
            source: Arc::new(err),
        })?;
        let children = classify_children(read_dir);

        let total = AtomicU64::new(0);
        let file_count = AtomicU64::new(0);
        let dirs: Vec<&Child> = children.iter().filter(|c| c.kind == ChildKind::Dir).collect();
        let workers = self.config.worker_count(num_cpus::get(), dirs.len());
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("duscope-worker-{i}"))
            .build()
            .map_err(|e| ScanError::WorkerPool(e.to_string()))?;
        debug!(children = children.len(), dirs = dirs.len(), workers, "Dispatching children");

        let (outcome, entries, large_files, dropped) = thread::scope(|s| {
            let (entry_tx, entry_rx) =
                bounded_queue::<DirEntry>(self.config.queue_capacity, self.config.queue_send_timeout);
            let (file_tx, file_rx) =
                bounded_queue::<FileEntry>(self.config.queue_capacity, self.config.queue_send_timeout);
            let max_entries = self.config.max_entries;
            let max_files = self.config.max_large_files;
            let entry_collector = s.spawn(move || entry_rx.collect_top(max_entries));
            let file_collector = s.spawn(move || file_rx.collect_top(max_files));

            let ctx = ScanContext {
                config: &self.config,
                rules: &self.rules,
                probe: &self.probe,
                caches: &self.caches,
                progress: &control.progress,
                cancel: control.cancel_flag(),
                fast_pool: self.fast_pool.as_ref(),
                files: Some(&file_tx),
            };

            for child in children.iter().filter(|c| c.kind != ChildKind::Dir) {
                let entry = size_leaf(child, &ctx);
                total.fetch_add(entry.size, Ordering::Relaxed);
                if child.kind == ChildKind::File {
                    file_count.fetch_add(1, Ordering::Relaxed);
                }
                entry_tx.push(entry);
            }

            let outcome = pool.install(|| {
                dirs.par_iter().try_for_each(|child| {
                    let chain = provider::chain_for(&child.path, &ctx, true);
                    let measured: Measured = provider::measure(chain, &child.path, &ctx)?;
                    total.fetch_add(measured.bytes, Ordering::Relaxed);
                    file_count.fetch_add(measured.files, Ordering::Relaxed);
                    entry_tx.push(DirEntry {
                        name: entry_name(&child.path),
                        path: child.path.clone(),
                        size: measured.bytes,
                        is_dir: true,
                        last_access: last_access(&child.meta),
                    });
                    Ok::<(), Cancelled>(())
                })
            });

            let dropped = entry_tx.dropped() + file_tx.dropped();
            drop(ctx);
            drop(entry_tx);
            drop(file_tx);
            let entries = entry_collector.join().unwrap_or_default();
            let large_files = file_collector.join().unwrap_or_default();
            (outcome, entries, large_files, dropped)
        });

        if dropped > 0 {
            debug!(dropped, "Collector queues dropped items");
            control.progress.add_dropped(dropped);
        }
        if outcome.is_err() {
            info!("Scan of {} cancelled after {:?}", root.display(), start.elapsed());
            return Err(ScanError::Cancelled);
        }

        let large_files = self.supplement_large_files(root, large_files, control);
        let result = ScanResult {
            entries,
            large_files,
            total_size: total.into_inner(),
            total_files: file_count.into_inner(),
        };
        info!(
            "Scan of {} complete: {} bytes, {} files in {:?}",
            root.display(),
            result.total_size,
            result.total_files,
            start.elapsed()
        );
        Ok(result)
    }

    /// Replace the heap-derived large-file list with the content-search
    /// tool's answer when that answer is longer.
    fn supplement_large_files(
        &self,
        root: &Path,
        from_walk: Vec<FileEntry>,
        control: &ScanControl,
    ) -> Vec<FileEntry> {
        if !self.probe.can_search() {
            return from_walk;
        }
        match self.probe.find_large_files(
            root,
            self.config.large_file_threshold,
            self.config.max_large_files,
            &self.rules,
            control.cancel_flag(),
        ) {
            Ok(found) if found.len() > from_walk.len() => {
                debug!(walk = from_walk.len(), search = found.len(), "Using search tool's large files");
                found
            }
            Ok(_) => from_walk,
            Err(err) => {
                debug!(error = %err, "Large-file search failed");
                from_walk
            }
        }
    }
}

/// Read and classify every child of the root. Unreadable children are
/// skipped.
fn classify_children(read_dir: fs::ReadDir) -> Vec<Child> {
    read_dir
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                debug!(error = %err, "Skipping unreadable child");
                None
            }
        })
        .filter_map(|entry| {
            let path = entry.path();
            let meta = match fs::symlink_metadata(&path) {
                Ok(meta) => meta,
                Err(err) => {
                    debug!(path = %path.display(), error = %err, "Skipping child without metadata");
                    return None;
                }
            };
            let file_type = meta.file_type();
            let kind = if file_type.is_symlink() {
                ChildKind::Symlink
            } else if file_type.is_dir() {
                ChildKind::Dir
            } else {
                ChildKind::File
            };
            Some(Child { path, kind, meta })
        })
        .collect()
}

/// Entry for a file or symlink child. Symlinks are charged their own size
/// and count as directories only when the target is one.
fn size_leaf(child: &Child, ctx: &ScanContext<'_>) -> DirEntry {
    let size = disk_usage(&child.meta);
    let is_dir = match child.kind {
        ChildKind::Symlink => fs::metadata(&child.path).is_ok_and(|m| m.is_dir()),
        _ => false,
    };
    if child.kind == ChildKind::File {
        ctx.progress.add_file(size);
        sizer::offer_large_file(&child.path, size, ctx);
    } else {
        ctx.progress.add_bytes(size);
    }
    DirEntry {
        name: entry_name(&child.path),
        path: child.path.clone(),
        size,
        is_dir,
        last_access: last_access(&child.meta),
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
