/// Folding rules: which directories are sized as one opaque unit.
///
/// A folded directory is measured by a fast external probe instead of
/// being expanded child by child. Two kinds of rule exist:
///
/// - an exact-name set (`node_modules`, `.git`, virtualenvs, build caches);
/// - per-tool [`FoldRule`] predicates for package-manager cache trees whose
///   interesting directories have hashed or generated names.
///
/// The same module owns the extension filter used for the large-file list.
use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Component, Path};

/// Directory names that are always folded.
const FOLD_NAMES: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    ".pnpm-store",
    ".yarn",
    ".venv",
    "venv",
    "__pycache__",
    ".pytest_cache",
    ".mypy_cache",
    ".tox",
    ".gradle",
    ".m2",
    ".cargo",
    "DerivedData",
    "Pods",
    ".cocoapods",
    ".next",
    ".nuxt",
    ".turbo",
    ".Trash",
];

/// Extensions excluded from the large-file list. Source and text files are
/// never the reason a disk is full, and listing them crowds out real hogs.
const SKIP_EXTENSIONS: &[&str] = &[
    "c", "cc", "cpp", "css", "go", "h", "hpp", "html", "java", "js", "json", "jsx", "kt", "md",
    "php", "py", "rb", "rs", "scss", "sh", "swift", "toml", "ts", "tsx", "txt", "xml", "yaml",
    "yml",
];

/// A named predicate recognising one tool's cache layout.
#[derive(Clone, Copy)]
pub struct FoldRule {
    pub tool: &'static str,
    pub matches: fn(&Path) -> bool,
}

impl std::fmt::Debug for FoldRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FoldRule").field("tool", &self.tool).finish()
    }
}

/// Built-in per-tool rules.
pub const BUILTIN_RULES: &[FoldRule] = &[
    FoldRule {
        tool: "npm",
        matches: npm_cache_shard,
    },
    FoldRule {
        tool: "pip",
        matches: pip_cache_shard,
    },
];

/// The complete folding policy used by a scanner.
#[derive(Debug, Clone)]
pub struct FoldRules {
    names: HashSet<String>,
    rules: Vec<FoldRule>,
}

impl Default for FoldRules {
    fn default() -> Self {
        Self {
            names: FOLD_NAMES.iter().map(|s| s.to_string()).collect(),
            rules: BUILTIN_RULES.to_vec(),
        }
    }
}

impl FoldRules {
    /// A policy that folds nothing.
    pub fn empty() -> Self {
        Self {
            names: HashSet::new(),
            rules: Vec::new(),
        }
    }

    /// Add an exact directory name to fold.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.names.insert(name.into());
        self
    }

    /// Register a per-tool predicate.
    pub fn register(&mut self, rule: FoldRule) {
        self.rules.push(rule);
    }

    /// Should the directory at `path` be sized as a single unit?
    pub fn is_foldable(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(OsStr::to_str) else {
            return false;
        };
        if self.names.contains(name) {
            return true;
        }
        self.rules.iter().any(|rule| (rule.matches)(path))
    }

    /// Name of the first tool rule matching `path`, for logging.
    pub fn matching_tool(&self, path: &Path) -> Option<&'static str> {
        self.rules
            .iter()
            .find(|rule| (rule.matches)(path))
            .map(|rule| rule.tool)
    }
}

/// Should a file be left out of the large-file list?
pub fn is_skipped_extension(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| {
            SKIP_EXTENSIONS
                .iter()
                .any(|skip| skip.eq_ignore_ascii_case(ext))
        })
}

/// Is `component` present anywhere in `path`?
fn has_component(path: &Path, component: &str) -> bool {
    path.components()
        .any(|c| matches!(c, Component::Normal(n) if n == component))
}

/// Does `child` directly follow one of `parents` anywhere in `path`?
fn has_component_pair(path: &Path, parents: &[&str], child: &str) -> bool {
    let names: Vec<&OsStr> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(n) => Some(n),
            _ => None,
        })
        .collect();
    names
        .windows(2)
        .any(|w| w[1] == child && parents.iter().any(|p| w[0] == *p))
}

fn parent_name(path: &Path) -> Option<&str> {
    path.parent()?.file_name()?.to_str()
}

/// Hashed shard directories are one or two characters long.
fn is_shard_name(name: &str) -> bool {
    (1..=2).contains(&name.chars().count())
}

/// npm (and tnpm) keep their content-addressed store under
/// `~/.npm/_cacache/{content-v2,index-v5}/<xx>/<yy>`. Fold the `_`-prefixed
/// children of the cache root and every shard level below the store roots.
fn npm_cache_shard(path: &Path) -> bool {
    if !has_component(path, ".npm") && !has_component(path, ".tnpm") {
        return false;
    }
    let (Some(name), Some(parent)) = (path.file_name().and_then(OsStr::to_str), parent_name(path))
    else {
        return false;
    };
    let parent_is_root = matches!(
        parent,
        ".npm" | ".tnpm" | "_cacache" | "content-v2" | "index-v5"
    );
    (parent_is_root || is_shard_name(parent)) && (name.starts_with('_') || is_shard_name(name))
}

/// pip's HTTP and wheel caches are sharded the same way:
/// `<cache>/pip/http/<a>/<b>/<c>/...`, where `<cache>` is `~/.cache` or
/// `~/Library/Caches`.
fn pip_cache_shard(path: &Path) -> bool {
    if !has_component_pair(path, &[".cache", "Caches"], "pip") {
        return false;
    }
    let (Some(name), Some(parent)) = (path.file_name().and_then(OsStr::to_str), parent_name(path))
    else {
        return false;
    };
    let parent_is_root = matches!(parent, "http" | "http-v2" | "wheels");
    (parent_is_root || is_shard_name(parent)) && is_shard_name(name)
}
