/// Error types for the core crate.
///
/// Only [`ScanError`] ever reaches a caller of `Scanner::scan`. Probe and
/// cache errors are consumed internally by the fallback chain and the cache
/// lookup respectively.
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Caller-visible scan failure.
///
/// `Clone` so a single in-flight scan can hand the same outcome to every
/// caller waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScanError {
    /// The root itself could not be listed (missing, not a directory, or
    /// permission denied).
    #[error("cannot read {path}: {source}")]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The scan was cancelled before it finished.
    #[error("scan cancelled")]
    Cancelled,

    /// The worker pool could not be created.
    #[error("failed to start worker pool: {0}")]
    WorkerPool(String),
}

/// Failure of an external size tool. Always recoverable: the caller moves
/// on to the next size provider.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("{program} exited with status {code:?}")]
    ExitStatus { program: String, code: Option<i32> },

    #[error("{program} produced unparsable output: {output:?}")]
    Unparsable { program: String, output: String },

    /// Too many callers are already queued for a probe slot.
    #[error("probe queue is full")]
    Saturated,

    #[error("cancelled while waiting for a probe slot")]
    Cancelled,
}

/// Failure while persisting cache state. Reads never produce this; a bad
/// read is reported as a cache miss instead.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache encoding error: {0}")]
    Encode(#[from] bincode::Error),

    #[error("overview encoding error: {0}")]
    Json(#[from] serde_json::Error),
}
