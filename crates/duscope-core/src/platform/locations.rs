/// Well-known locations.
///
/// The scanner treats a few paths specially: the overview roots get a
/// coarse TTL-cached size, and known-huge directories consult that coarse
/// value before doing any work of their own.
use std::path::PathBuf;

/// The current user's home directory, from `$HOME`.
pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
}

/// Top-level paths whose size is kept in the overview store.
///
/// Includes every known-huge directory, so the overview prefetch keeps a
/// value ready for them.
pub fn overview_roots() -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = home_dir().into_iter().collect();
    roots.extend(known_huge_dirs());
    if cfg!(target_os = "macos") {
        roots.push(PathBuf::from("/Volumes"));
    }
    roots
}

/// Directories known to be enormous and slow to expand.
pub fn known_huge_dirs() -> Vec<PathBuf> {
    match home_dir() {
        Some(home) if cfg!(target_os = "macos") => vec![home.join("Library")],
        Some(home) => vec![home.join(".cache")],
        None => Vec::new(),
    }
}

/// Default directory for persisted scan results.
///
/// `$XDG_CACHE_HOME/duscope` when set, otherwise `~/.cache/duscope`, and a
/// temp-dir fallback when no home directory is known.
pub fn default_cache_dir() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_CACHE_HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(xdg).join("duscope");
    }
    match home_dir() {
        Some(home) => home.join(".cache").join("duscope"),
        None => std::env::temp_dir().join("duscope-cache"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_huge_dirs_are_overview_roots() {
        let roots = overview_roots();
        for dir in known_huge_dirs() {
            assert!(roots.contains(&dir), "{} missing from {roots:?}", dir.display());
        }
    }
}
