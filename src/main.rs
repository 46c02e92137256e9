//! duscope: parallel directory sizing from the command line.
//!
//! Thin binary entry point. All logic lives in the `duscope-core` crate;
//! this file parses flags, builds the scanner and prints its result.

use anyhow::Context;
use clap::Parser;
use duscope_core::cache::ScanCaches;
use duscope_core::model::{format_count, format_size, ScanResult};
use duscope_core::{Config, Scanner};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

/// How often the progress line is refreshed while a scan runs.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Parser)]
#[command(name = "duscope", version, about = "Show what is using the disk under a directory")]
struct Cli {
    /// Directory to scan.
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Number of children to list.
    #[arg(short = 'n', long)]
    top: Option<usize>,

    /// Number of large files to list.
    #[arg(long)]
    files: Option<usize>,

    /// Ignore a cached result for the root.
    #[arg(long)]
    fresh: bool,

    /// Drop cached sizes for the path and its ancestors before scanning.
    #[arg(long)]
    invalidate: bool,

    /// Print the result as JSON.
    #[arg(long)]
    json: bool,

    /// Refresh the overview sizes of the configured roots and exit.
    #[arg(long)]
    prefetch: bool,

    /// JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Cache directory override.
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Do not ask the content-search tool for large files.
    #[arg(long)]
    no_search: bool,

    /// Show progress and more log output (repeat for debug logging).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("duscope starting");

    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(top) = cli.top {
        config.scan.max_entries = top;
    }
    if let Some(files) = cli.files {
        config.scan.max_large_files = files;
    }
    if cli.no_search {
        config.scan.search_program = None;
    }
    if let Some(dir) = cli.cache_dir.clone() {
        config.cache.dir = dir;
    }

    let caches = Arc::new(ScanCaches::new(&config.cache));
    let scanner = Arc::new(Scanner::new(config.scan, caches));

    if cli.prefetch {
        let cancel = Arc::new(AtomicBool::new(false));
        let outcome = scanner
            .spawn_overview_prefetch(cancel)
            .context("failed to start overview prefetch")?
            .join()
            .map_err(|_| anyhow::anyhow!("overview prefetch panicked"))?;
        println!(
            "overview: {} measured, {} fresh, {} failed",
            outcome.measured, outcome.fresh, outcome.failed
        );
        return Ok(());
    }

    if cli.invalidate {
        scanner.invalidate(&cli.path);
    }

    let result = run_scan(&scanner, &cli)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&*result)?);
    } else {
        print_table(&result);
    }
    Ok(())
}

/// Run the scan on a background thread, redrawing a progress line on
/// stderr when `--verbose` is given.
fn run_scan(scanner: &Arc<Scanner>, cli: &Cli) -> anyhow::Result<Arc<ScanResult>> {
    let handle = scanner.start(cli.path.clone(), cli.fresh);
    let show_progress = cli.verbose > 0 && !cli.json;

    let outcome = loop {
        match handle.result_rx.recv_timeout(PROGRESS_INTERVAL) {
            Ok(outcome) => break outcome,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                if show_progress {
                    let p = handle.progress();
                    eprint!(
                        "\r{} files, {} dirs, {}   ",
                        format_count(p.files_found),
                        format_count(p.dirs_found),
                        format_size(p.total_size)
                    );
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                anyhow::bail!("scanner thread exited without a result")
            }
        }
    };
    if show_progress {
        eprintln!();
    }

    outcome.with_context(|| format!("failed to scan {}", cli.path.display()))
}

fn print_table(result: &ScanResult) {
    println!(
        "{:>10}  total, {} files",
        format_size(result.total_size),
        format_count(result.total_files)
    );
    println!();
    for entry in &result.entries {
        let marker = if entry.is_dir { "/" } else { "" };
        println!("{:>10}  {}{}", format_size(entry.size), entry.name, marker);
    }
    if !result.large_files.is_empty() {
        println!();
        println!("Largest files:");
        for file in &result.large_files {
            println!("{:>10}  {}", format_size(file.size), file.path.display());
        }
    }
}
