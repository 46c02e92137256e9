/// Scan output records.
///
/// A scan produces one [`DirEntry`] per immediate child of the root and a
/// separate list of [`FileEntry`] for the largest files found anywhere in
/// the subtree. Both lists are capped by the collector that produced them.
use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Anything that can be ranked by a byte count.
///
/// Implemented by both entry types so a single bounded heap serves the
/// directory list and the large-file list.
pub trait HasSize {
    fn size(&self) -> u64;
}

/// One immediate child of a scanned root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// File or directory name only.
    pub name: CompactString,
    /// Absolute path.
    #[serde(with = "path_serde")]
    pub path: PathBuf,
    /// Allocated size in bytes (block-based, not logical length).
    /// For directories this is the size of the whole subtree.
    pub size: u64,
    /// `true` for directories and for symlinks that resolve to one.
    pub is_dir: bool,
    /// Last access time, when the platform reports one.
    pub last_access: Option<DateTime<Utc>>,
}

/// A single large file, used only for the "largest files" list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: CompactString,
    #[serde(with = "path_serde")]
    pub path: PathBuf,
    pub size: u64,
}

impl HasSize for DirEntry {
    #[inline]
    fn size(&self) -> u64 {
        self.size
    }
}

impl HasSize for FileEntry {
    #[inline]
    fn size(&self) -> u64 {
        self.size
    }
}

/// The complete result of scanning one root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Largest children, sorted descending by size.
    pub entries: Vec<DirEntry>,
    /// Largest files anywhere under the root, sorted descending by size.
    pub large_files: Vec<FileEntry>,
    /// Sum of every child's size. Never degraded by dropped list items.
    pub total_size: u64,
    /// Number of regular files counted while sizing. Subtrees measured by an
    /// external probe contribute no files.
    pub total_files: u64,
}

/// Path encoding that survives names which are not valid UTF-8.
///
/// Binary formats (the disk cache) get the raw OS bytes so the path comes
/// back exactly. Human-readable formats (JSON output) get the lossy display
/// form, since a JSON string cannot hold arbitrary bytes.
pub(crate) mod path_serde {
    use serde::de::{self, SeqAccess, Visitor};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::fmt;
    use std::path::{Path, PathBuf};

    pub fn serialize<S: Serializer>(path: &Path, s: S) -> Result<S::Ok, S::Error> {
        if s.is_human_readable() {
            s.collect_str(&path.display())
        } else {
            s.serialize_bytes(&to_bytes(path))
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<PathBuf, D::Error> {
        if d.is_human_readable() {
            String::deserialize(d).map(PathBuf::from)
        } else {
            d.deserialize_byte_buf(BytesVisitor)
        }
    }

    #[cfg(unix)]
    fn to_bytes(path: &Path) -> std::borrow::Cow<'_, [u8]> {
        use std::os::unix::ffi::OsStrExt;
        std::borrow::Cow::Borrowed(path.as_os_str().as_bytes())
    }

    #[cfg(not(unix))]
    fn to_bytes(path: &Path) -> std::borrow::Cow<'_, [u8]> {
        match path.to_string_lossy() {
            std::borrow::Cow::Borrowed(s) => std::borrow::Cow::Borrowed(s.as_bytes()),
            std::borrow::Cow::Owned(s) => std::borrow::Cow::Owned(s.into_bytes()),
        }
    }

    #[cfg(unix)]
    fn from_bytes(bytes: Vec<u8>) -> PathBuf {
        use std::os::unix::ffi::OsStringExt;
        PathBuf::from(std::ffi::OsString::from_vec(bytes))
    }

    #[cfg(not(unix))]
    fn from_bytes(bytes: Vec<u8>) -> PathBuf {
        PathBuf::from(String::from_utf8_lossy(&bytes).into_owned())
    }

    struct BytesVisitor;

    impl<'de> Visitor<'de> for BytesVisitor {
        type Value = PathBuf;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("path bytes")
        }

        fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<PathBuf, E> {
            Ok(from_bytes(v.to_vec()))
        }

        fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<PathBuf, E> {
            Ok(from_bytes(v))
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<PathBuf, A::Error> {
            let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(4_096));
            while let Some(b) = seq.next_element::<u8>()? {
                bytes.push(b);
            }
            Ok(from_bytes(bytes))
        }
    }
}

/// Extract the display name of a path, falling back to the full path for
/// roots such as `/`.
pub(crate) fn entry_name(path: &std::path::Path) -> CompactString {
    match path.file_name() {
        Some(name) => CompactString::new(name.to_string_lossy()),
        None => CompactString::new(path.to_string_lossy()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn entry_name_uses_last_component() {
        assert_eq!(entry_name(Path::new("/Users/me/Downloads")), "Downloads");
    }

    #[test]
    fn entry_name_of_root_is_the_path() {
        assert_eq!(entry_name(Path::new("/")), "/");
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_path_survives_binary_and_renders_in_json() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let path = Path::new("/data").join(OsStr::from_bytes(b"big\xff.dat"));
        let file = FileEntry {
            name: entry_name(&path),
            path: path.clone(),
            size: 50_000,
        };

        let bytes = bincode::serialize(&file).unwrap();
        let back: FileEntry = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back.path, path);

        let json = serde_json::to_string(&file).unwrap();
        assert!(json.contains("/data/big\u{FFFD}.dat"), "{json}");
    }
}
