/// duscope core: directory sizing, top-K collection and result caching.
///
/// This crate contains all business logic with zero UI dependencies.
/// A frontend calls [`scanner::Scanner::scan`] (or `start` for a background
/// scan), polls the progress counters while it runs, renders the returned
/// [`model::ScanResult`], and calls `invalidate` after deleting anything.
///
/// # Modules
///
/// - [`model`]: Scan result records and size formatting.
/// - [`analysis`]: Bounded top-K heap and directory folding rules.
/// - [`probe`]: External size tools behind timeouts and admission gates.
/// - [`cache`]: Per-path disk cache and the TTL overview store.
/// - [`scanner`]: Scan orchestration, size providers and directory sizers.
/// - [`platform`]: Block-size metadata and well-known locations.
/// - [`config`]: Tunables with named defaults.
/// - [`error`]: Error types.
pub mod analysis;
pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod platform;
pub mod probe;
pub mod scanner;

pub use config::{CacheConfig, Config, ScanConfig};
pub use error::ScanError;
pub use model::{DirEntry, FileEntry, ScanResult};
pub use scanner::{ScanHandle, Scanner};
