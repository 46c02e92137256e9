//! Integration tests for the external-tool probes.
//!
//! These run the system `du` and a small shell script standing in for the
//! content-search tool, so they are Unix-only.
#![cfg(unix)]

use duscope_core::analysis::FoldRules;
use duscope_core::cache::ScanCaches;
use duscope_core::probe::SizeProbe;
use duscope_core::{CacheConfig, ScanConfig, Scanner};
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tempfile::TempDir;

// ── Helpers ──────────────────────────────────────────────────────────────────

fn write_bytes(path: &Path, n: usize) {
    let mut f = fs::File::create(path).unwrap();
    f.write_all(&vec![0xA5u8; n]).unwrap();
    f.sync_all().unwrap();
}

fn du_config() -> ScanConfig {
    ScanConfig {
        du_program: "du".to_string(),
        search_program: None,
        overview_roots: Vec::new(),
        known_huge_dirs: Vec::new(),
        ..ScanConfig::default()
    }
}

/// A stand-in search tool: called as `<tool> -onlyin <root> <query>`, it
/// lists every regular file under `<root>`.
fn fake_search_tool(dir: &Path) -> PathBuf {
    let script = dir.join("fake-search.sh");
    fs::write(&script, "#!/bin/sh\nfind \"$2\" -type f\n").unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    script
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[test]
fn du_reports_allocated_kilobytes() {
    let tree = TempDir::new().unwrap();
    write_bytes(&tree.path().join("a.dat"), 300_000);
    let probe = SizeProbe::new(&du_config());

    let bytes = probe.measure(tree.path(), &AtomicBool::new(false)).unwrap();
    assert!(bytes >= 300_000, "{bytes}");
    assert_eq!(bytes % 1024, 0);
}

/// Excluding a subtree equals the difference of the two measurements,
/// within a few blocks of slack for directory inodes.
#[test]
fn excluding_a_subtree_subtracts_it() {
    let tree = TempDir::new().unwrap();
    let child = tree.path().join("child");
    fs::create_dir(&child).unwrap();
    write_bytes(&tree.path().join("keep.dat"), 200_000);
    write_bytes(&child.join("drop.dat"), 400_000);

    let probe = SizeProbe::new(&du_config());
    let cancel = AtomicBool::new(false);
    let whole = probe.measure(tree.path(), &cancel).unwrap();
    let part = probe.measure(&child, &cancel).unwrap();
    let rest = probe.measure_excluding(tree.path(), &child, &cancel).unwrap();

    assert_eq!(rest, whole - part);
    assert!(rest >= 200_000 && rest < 400_000, "{rest}");
}

#[test]
fn excluding_a_larger_tree_clamps_to_zero() {
    let tree = TempDir::new().unwrap();
    let child = tree.path().join("child");
    fs::create_dir(&child).unwrap();
    write_bytes(&tree.path().join("big.dat"), 500_000);

    let probe = SizeProbe::new(&du_config());
    let rest = probe
        .measure_excluding(&child, tree.path(), &AtomicBool::new(false))
        .unwrap();
    assert_eq!(rest, 0);
}

#[test]
fn missing_du_is_an_error_not_a_panic() {
    let tree = TempDir::new().unwrap();
    let config = ScanConfig {
        du_program: "duscope-test-no-such-du".to_string(),
        ..du_config()
    };
    let probe = SizeProbe::new(&config);
    assert!(probe.measure(tree.path(), &AtomicBool::new(false)).is_err());
}

/// The search tool's answer is filtered: skipped extensions, small files
/// and anything inside a folded directory never come back.
#[test]
fn search_results_are_filtered() {
    let tree = TempDir::new().unwrap();
    let tools = TempDir::new().unwrap();
    let modules = tree.path().join("node_modules");
    fs::create_dir(&modules).unwrap();
    write_bytes(&tree.path().join("movie.mp4"), 120_000);
    write_bytes(&tree.path().join("notes.txt"), 120_000);
    write_bytes(&tree.path().join("small.bin"), 1_000);
    write_bytes(&modules.join("bundle.bin"), 150_000);

    let config = ScanConfig {
        search_program: Some(fake_search_tool(tools.path()).display().to_string()),
        ..du_config()
    };
    let probe = SizeProbe::new(&config);
    let found = probe
        .find_large_files(tree.path(), 100_000, 10, &FoldRules::default(), &AtomicBool::new(false))
        .unwrap();

    let names: Vec<&str> = found.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["movie.mp4"]);
}

/// Files under a known-huge directory are invisible to the walk; the
/// search tool fills them in.
#[test]
fn scan_supplements_large_files_from_search() {
    let tree = TempDir::new().unwrap();
    let tools = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let library = tree.path().join("Library");
    fs::create_dir(&library).unwrap();
    write_bytes(&library.join("backup.tar"), 250_000);

    let config = ScanConfig {
        search_program: Some(fake_search_tool(tools.path()).display().to_string()),
        known_huge_dirs: vec![library.clone()],
        large_file_threshold: 100_000,
        ..du_config()
    };
    let caches = Arc::new(ScanCaches::new(&CacheConfig::in_dir(cache.path())));
    let scanner = Scanner::new(config, caches);

    let result = scanner.scan(tree.path()).unwrap();
    assert_eq!(result.large_files.len(), 1);
    assert_eq!(result.large_files[0].path, library.join("backup.tar"));
}

/// Folded directories are sized by the probe, which counts the directory
/// inodes too, so the total is at least the file bytes.
#[test]
fn folded_directory_is_sized_by_du() {
    let tree = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let git = tree.path().join(".git");
    fs::create_dir_all(git.join("objects")).unwrap();
    write_bytes(&git.join("objects").join("pack.bin"), 90_000);

    let caches = Arc::new(ScanCaches::new(&CacheConfig::in_dir(cache.path())));
    let scanner = Scanner::new(du_config(), caches);
    let result = scanner.scan(tree.path()).unwrap();

    let entry = result.entries.iter().find(|e| e.path == git).unwrap();
    assert!(entry.size >= 90_000);
    assert_eq!(entry.size % 1024, 0);
}
