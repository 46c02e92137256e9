/// Data model for scan results.
///
/// Re-exports the entry records and size formatting helpers.
pub mod entry;
pub mod size;

pub use entry::{DirEntry, FileEntry, HasSize, ScanResult};
pub use size::{format_count, format_size};
