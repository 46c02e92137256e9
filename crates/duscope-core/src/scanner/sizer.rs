/// DirSizer: recursive directory sizing.
///
/// Two variants share one contract (directory in, [`Measured`] out):
///
/// - **Fast** ([`fast_size`]): a flat `jwalk` parallel walk over the whole
///   subtree on the scanner's shared fast-walk pool. No large-file
///   tracking. Bounded by a deadline; on expiry the partial sum is returned.
/// - **Tracking** ([`tracking_size`]): one `read_dir` per level, files
///   summed inline, subdirectories fanned out on the current rayon pool and
///   each routed through the provider chains again (so folded directories
///   deep in the tree still go to the probe). Large files are offered to
///   the collector queue as they are found.
///
/// Only non-directory entries contribute bytes. Sizes are allocated blocks,
/// see [`crate::platform::disk_usage`].
use crate::analysis::is_skipped_extension;
use crate::model::entry::entry_name;
use crate::model::FileEntry;
use crate::platform::disk_usage;
use crate::scanner::provider::{self, Cancelled, Measured, ScanContext};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// How many entries the fast walk processes between deadline checks.
const DEADLINE_CHECK_INTERVAL: u64 = 256;

/// Size `root` with a flat parallel walk.
pub fn fast_size(root: &Path, ctx: &ScanContext<'_>) -> Result<Measured, Cancelled> {
    let start = Instant::now();
    let deadline = start + ctx.config.fast_walk_deadline;
    let mut total = Measured::default();
    let mut seen: u64 = 0;

    let parallelism = match ctx.fast_pool {
        Some(pool) => jwalk::Parallelism::RayonExistingPool {
            pool: Arc::clone(pool),
            busy_timeout: None,
        },
        None => jwalk::Parallelism::RayonNewPool(ctx.config.fast_walk_workers.max(1)),
    };
    let walker = jwalk::WalkDir::new(root)
        .skip_hidden(false)
        .follow_links(false)
        .parallelism(parallelism);

    for entry_result in walker {
        ctx.check_cancel()?;
        seen += 1;
        if seen % DEADLINE_CHECK_INTERVAL == 0 && Instant::now() >= deadline {
            warn!(
                path = %root.display(),
                elapsed = ?start.elapsed(),
                bytes = total.bytes,
                "Fast walk hit its deadline; returning partial size"
            );
            break;
        }

        let entry = match entry_result {
            Ok(e) => e,
            Err(err) => {
                debug!(error = %err, "Fast walk skipped an unreadable entry");
                continue;
            }
        };
        let file_type = entry.file_type();
        if file_type.is_dir() {
            if entry.depth() > 0 {
                ctx.progress.enter_dir(&entry.path());
            }
            continue;
        }

        let meta = match fs::symlink_metadata(entry.path()) {
            Ok(meta) => meta,
            Err(err) => {
                debug!(error = %err, "Fast walk could not stat an entry");
                continue;
            }
        };
        let bytes = disk_usage(&meta);
        total.bytes += bytes;
        if file_type.is_file() {
            total.files += 1;
            ctx.progress.add_file(bytes);
        } else {
            ctx.progress.add_bytes(bytes);
        }
    }

    debug!(path = %root.display(), bytes = total.bytes, elapsed = ?start.elapsed(), "Fast walk done");
    Ok(total)
}

/// Size `dir` recursively, offering large files to the collector.
pub fn tracking_size(dir: &Path, ctx: &ScanContext<'_>) -> Result<Measured, Cancelled> {
    ctx.check_cancel()?;
    ctx.progress.enter_dir(dir);

    let read_dir = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(err) => {
            debug!(path = %dir.display(), error = %err, "Skipping unreadable directory");
            return Ok(Measured::default());
        }
    };

    let mut total = Measured::default();
    let mut subdirs: Vec<PathBuf> = Vec::new();

    for entry in read_dir {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                debug!(path = %dir.display(), error = %err, "Skipping unreadable entry");
                continue;
            }
        };
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let path = entry.path();
        if file_type.is_dir() {
            subdirs.push(path);
            continue;
        }

        // `DirEntry::metadata` does not follow symlinks, so a link is
        // charged its own size and never its target's.
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "Skipping entry without metadata");
                continue;
            }
        };
        let bytes = disk_usage(&meta);
        total.bytes += bytes;
        if file_type.is_file() {
            total.files += 1;
            ctx.progress.add_file(bytes);
            offer_large_file(&path, bytes, ctx);
        } else {
            ctx.progress.add_bytes(bytes);
        }
    }

    let nested = subdirs
        .par_iter()
        .map(|sub| provider::measure(provider::chain_for(sub, ctx, false), sub, ctx))
        .try_reduce(Measured::default, |mut a, b| {
            a += b;
            Ok(a)
        })?;
    total += nested;
    Ok(total)
}

/// Queue `path` for the large-file list if it qualifies.
pub(crate) fn offer_large_file(path: &Path, bytes: u64, ctx: &ScanContext<'_>) {
    if bytes < ctx.config.large_file_threshold || is_skipped_extension(path) {
        return;
    }
    ctx.offer_file(FileEntry {
        name: entry_name(path),
        path: path.to_path_buf(),
        size: bytes,
    });
}
