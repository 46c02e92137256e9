/// SizeProbe: external size-measurement tools behind timeouts and an
/// admission gate.
///
/// - [`SizeProbe::measure`] runs `<du> -skP <path>` and scales the first
///   field from kilobytes to bytes.
/// - [`SizeProbe::measure_excluding`] subtracts one subtree from another.
/// - [`SizeProbe::find_large_files`] asks a content-search tool (Spotlight's
///   `mdfind` by default) for files above a size threshold.
///
/// Every failure is a [`ProbeError`]; callers treat it as "try the next
/// provider", never as a scan failure.
pub mod command;
pub mod gate;

use crate::analysis::{is_skipped_extension, FoldRules, TopK};
use crate::config::ScanConfig;
use crate::error::ProbeError;
use crate::model::entry::entry_name;
use crate::model::FileEntry;
use crate::platform::disk_usage;
use gate::ProbeGate;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

pub use command::run_with_timeout;

pub struct SizeProbe {
    du_program: String,
    du_timeout: Duration,
    search_program: Option<String>,
    search_timeout: Duration,
    gate: ProbeGate,
}

impl SizeProbe {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            du_program: config.du_program.clone(),
            du_timeout: config.du_timeout,
            search_program: config.search_program.clone(),
            search_timeout: config.search_timeout,
            gate: ProbeGate::new(config.max_running_probes, config.max_queued_probes),
        }
    }

    /// Allocated bytes under `path` according to the disk-usage tool.
    pub fn measure(&self, path: &Path, cancel: &AtomicBool) -> Result<u64, ProbeError> {
        let _permit = self.gate.acquire(cancel)?;
        let output = run_with_timeout(
            &self.du_program,
            [std::ffi::OsStr::new("-skP"), path.as_os_str()],
            self.du_timeout,
        )?;
        parse_du_output(&self.du_program, &output)
    }

    /// Size of `path` without the `excluded` subtree, clamped at zero.
    pub fn measure_excluding(
        &self,
        path: &Path,
        excluded: &Path,
        cancel: &AtomicBool,
    ) -> Result<u64, ProbeError> {
        let whole = self.measure(path, cancel)?;
        let skipped = self.measure(excluded, cancel)?;
        Ok(whole.saturating_sub(skipped))
    }

    /// Whether a content-search tool is configured.
    pub fn can_search(&self) -> bool {
        self.search_program.is_some()
    }

    /// Files of at least `threshold` bytes under `root`, largest first,
    /// at most `limit` of them.
    ///
    /// Results pass the same filters as the walker's large-file list: no
    /// skipped extensions and nothing inside a folded directory.
    pub fn find_large_files(
        &self,
        root: &Path,
        threshold: u64,
        limit: usize,
        rules: &FoldRules,
        cancel: &AtomicBool,
    ) -> Result<Vec<FileEntry>, ProbeError> {
        let Some(program) = self.search_program.as_deref() else {
            return Ok(Vec::new());
        };
        let _permit = self.gate.acquire(cancel)?;
        let query = format!("kMDItemFSSize >= {threshold}");
        let output = run_with_timeout(
            program,
            [
                std::ffi::OsStr::new("-onlyin"),
                root.as_os_str(),
                std::ffi::OsStr::new(&query),
            ],
            self.search_timeout,
        )?;

        let mut top = TopK::new(limit);
        for line in output.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let path = Path::new(line);
            if !path.starts_with(root) || is_skipped_extension(path) {
                continue;
            }
            if inside_folded(path, root, rules) {
                continue;
            }
            let Ok(meta) = std::fs::symlink_metadata(path) else {
                continue;
            };
            if !meta.is_file() || meta.len() < threshold {
                continue;
            }
            top.push(FileEntry {
                name: entry_name(path),
                path: path.to_path_buf(),
                size: disk_usage(&meta),
            });
        }
        Ok(top.into_sorted_desc())
    }
}

/// Is any directory between `root` (exclusive) and `path` folded?
fn inside_folded(path: &Path, root: &Path, rules: &FoldRules) -> bool {
    path.ancestors()
        .skip(1)
        .take_while(|ancestor| *ancestor != root)
        .any(|ancestor| rules.is_foldable(ancestor))
}

/// Parse `du -sk` output: the first whitespace-delimited field is a count
/// of kilobytes.
pub fn parse_du_output(program: &str, output: &str) -> Result<u64, ProbeError> {
    output
        .split_whitespace()
        .next()
        .and_then(|field| field.parse::<u64>().ok())
        .map(|kb| kb.saturating_mul(1024))
        .ok_or_else(|| ProbeError::Unparsable {
            program: program.to_string(),
            output: output.chars().take(200).collect(),
        })
}
