/// Platform-specific functionality: on-disk size from stat metadata and
/// the well-known locations the scanner treats specially.

pub mod locations;
pub mod metadata;

pub use locations::{default_cache_dir, home_dir, known_huge_dirs, overview_roots};
pub use metadata::{disk_usage, last_access};
