/// Size and timestamp extraction from `std::fs::Metadata`.
use chrono::{DateTime, Utc};
use std::fs::Metadata;

/// Bytes actually allocated on disk for this entry.
///
/// On Unix this is `st_blocks * 512`, which accounts for sparse files,
/// compression and block rounding. Elsewhere the logical length is used.
#[cfg(unix)]
pub fn disk_usage(meta: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    let blocks = meta.blocks();
    if blocks == 0 && meta.len() > 0 && !meta.is_dir() {
        // Some filesystems (FUSE, network mounts) report no blocks at all.
        return meta.len();
    }
    blocks.saturating_mul(512)
}

#[cfg(not(unix))]
pub fn disk_usage(meta: &Metadata) -> u64 {
    meta.len()
}

/// Last access time, if the platform records one.
pub fn last_access(meta: &Metadata) -> Option<DateTime<Utc>> {
    meta.accessed().ok().map(DateTime::<Utc>::from)
}
