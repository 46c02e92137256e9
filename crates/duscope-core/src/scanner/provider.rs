/// Size providers and the fallback chains that order them.
///
/// Each directory is sized by walking a fixed list of [`SizeSource`]s and
/// taking the first one that produces an answer. The lists are data, so
/// the fallback policy for each kind of directory reads in one line:
///
/// | directory kind | chain |
/// |---|---|
/// | known-huge (e.g. `~/Library`) | overview → disk cache → fast walk |
/// | foldable | probe → fast walk |
/// | other, top level | disk cache → tracking walk |
/// | other, nested | tracking walk |
use crate::analysis::FoldRules;
use crate::cache::ScanCaches;
use crate::config::ScanConfig;
use crate::error::ProbeError;
use crate::model::FileEntry;
use crate::probe::SizeProbe;
use crate::scanner::progress::ScanProgress;
use crate::scanner::queue::QueueSender;
use crate::scanner::sizer;
use std::ops::AddAssign;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// One way of finding out how big a directory is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeSource {
    /// TTL-bounded coarse size from the overview store.
    Overview,
    /// A previous full scan of this exact directory.
    DiskCache,
    /// The external disk-usage tool. Only a positive answer counts.
    Probe,
    /// Deadline-bound parallel walk without large-file tracking.
    FastWalk,
    /// Recursive walk that feeds large files into the collector.
    TrackingWalk,
}

use SizeSource::*;

pub const KNOWN_HUGE_CHAIN: &[SizeSource] = &[Overview, DiskCache, FastWalk];
pub const FOLDED_CHAIN: &[SizeSource] = &[Probe, FastWalk];
pub const DIRECTORY_CHAIN: &[SizeSource] = &[DiskCache, TrackingWalk];
pub const NESTED_CHAIN: &[SizeSource] = &[TrackingWalk];

/// Bytes and regular files found under a directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Measured {
    pub bytes: u64,
    pub files: u64,
}

impl Measured {
    pub fn bytes(bytes: u64) -> Self {
        Self { bytes, files: 0 }
    }
}

impl AddAssign for Measured {
    fn add_assign(&mut self, rhs: Self) {
        self.bytes += rhs.bytes;
        self.files += rhs.files;
    }
}

/// The scan was cancelled; abandon the subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Everything a worker needs to size a directory.
pub struct ScanContext<'a> {
    pub config: &'a ScanConfig,
    pub rules: &'a FoldRules,
    pub probe: &'a SizeProbe,
    pub caches: &'a ScanCaches,
    pub progress: &'a ScanProgress,
    pub cancel: &'a AtomicBool,
    /// Pool shared by every fast walk of the scan. `None` gives each walk
    /// a pool of its own.
    pub fast_pool: Option<&'a Arc<rayon::ThreadPool>>,
    /// Destination for large-file candidates. `None` when only a total is
    /// wanted (overview measurements).
    pub files: Option<&'a QueueSender<FileEntry>>,
}

impl ScanContext<'_> {
    #[inline]
    pub fn check_cancel(&self) -> Result<(), Cancelled> {
        if self.cancel.load(Ordering::Relaxed) {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn offer_file(&self, file: FileEntry) {
        if let Some(files) = self.files {
            files.push(file);
        }
    }
}

/// Pick the chain for a directory.
pub fn chain_for(path: &Path, ctx: &ScanContext<'_>, top_level: bool) -> &'static [SizeSource] {
    if ctx.config.known_huge_dirs.iter().any(|huge| huge == path) {
        KNOWN_HUGE_CHAIN
    } else if ctx.rules.is_foldable(path) {
        FOLDED_CHAIN
    } else if top_level {
        DIRECTORY_CHAIN
    } else {
        NESTED_CHAIN
    }
}

/// Size `path` with the first source in `chain` that answers.
///
/// A chain whose sources all decline yields zero; the walk sources never
/// decline, so in practice every chain ends with an answer.
pub fn measure(chain: &[SizeSource], path: &Path, ctx: &ScanContext<'_>) -> Result<Measured, Cancelled> {
    for &source in chain {
        ctx.check_cancel()?;
        if let Some(measured) = attempt(source, path, ctx)? {
            if source != Overview && chain.contains(&Overview) {
                remember_overview(path, measured.bytes, ctx);
            }
            return Ok(measured);
        }
        debug!(path = %path.display(), ?source, "Size source declined; trying next");
    }
    Ok(Measured::default())
}

/// Keep a measurement of a chain that starts from the overview store, so
/// the next scan finds it there.
fn remember_overview(path: &Path, bytes: u64, ctx: &ScanContext<'_>) {
    if let Err(err) = ctx.caches.overview.put(path, bytes) {
        warn!(path = %path.display(), error = %err, "Failed to persist overview size");
    }
}

fn attempt(source: SizeSource, path: &Path, ctx: &ScanContext<'_>) -> Result<Option<Measured>, Cancelled> {
    match source {
        Overview => Ok(ctx.caches.overview.get(path).map(|bytes| {
            ctx.progress.add_bytes(bytes);
            Measured::bytes(bytes)
        })),
        DiskCache => Ok(ctx.caches.disk.load(path).hit().map(|entry| {
            ctx.progress.add_bytes(entry.total_size);
            for file in entry.large_files {
                ctx.offer_file(file);
            }
            Measured {
                bytes: entry.total_size,
                files: entry.total_files,
            }
        })),
        Probe => match ctx.probe.measure(path, ctx.cancel) {
            Ok(bytes) if bytes > 0 => {
                ctx.progress.add_bytes(bytes);
                Ok(Some(Measured::bytes(bytes)))
            }
            Ok(_) => Ok(None),
            Err(ProbeError::Cancelled) => Err(Cancelled),
            Err(err) => {
                debug!(path = %path.display(), error = %err, "Probe failed");
                Ok(None)
            }
        },
        FastWalk => sizer::fast_size(path, ctx).map(Some),
        TrackingWalk => sizer::tracking_size(path, ctx).map(Some),
    }
}
