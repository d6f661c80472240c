use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Entry kind for plain filesystem artifacts. Meta: `sha1`, `m_time`, `size`.
pub const PATH_KIND: &str = "path";

/// Entry kind for "the set of files matching a glob" dependencies. Meta:
/// `files`, the ordered list of matches at recording time.
pub const GLOB_MANIFEST_KIND: &str = "glob_manifest";

/// Custody information for a single artifact: an open-ended `kind`, a stable
/// `key` identifying the artifact (a prefixed path, a URL, a glob pattern),
/// and kind-specific metadata used by the registered freshness checker.
#[derive(Debug, Clone, PartialEq)]
pub struct CustodyEntry {
    kind: Arc<str>,
    key: String,
    meta: Json,
}

impl CustodyEntry {
    pub fn new(kind: impl Into<Arc<str>>, key: impl Into<String>, meta: Json) -> Self {
        CustodyEntry { kind: kind.into(), key: key.into(), meta }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn meta(&self) -> &Json {
        &self.meta
    }

    /// A field of the kind-specific metadata.
    pub fn get(&self, field: &str) -> Option<&Json> {
        self.meta.get(field)
    }
}

impl fmt::Display for CustodyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.key)
    }
}

/// The stored form of a [`CustodyEntry`], serialized as the two-element
/// `[kind, meta]` array the cache file uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaRecord(pub String, pub Json);

impl MetaRecord {
    pub fn kind(&self) -> &str {
        &self.0
    }

    pub fn meta(&self) -> &Json {
        &self.1
    }

    /// Rehydrate the full entry for `key`.
    pub fn entry(&self, key: &str) -> CustodyEntry {
        CustodyEntry::new(self.0.as_str(), key, self.1.clone())
    }
}

impl From<&CustodyEntry> for MetaRecord {
    fn from(entry: &CustodyEntry) -> Self {
        MetaRecord(entry.kind().to_string(), entry.meta().clone())
    }
}

/// A transform's upstream: either a file participating in the build, or a
/// pre-constructed entry for a hidden dependency (a template, a packed file
/// list, a fetched URL).
#[derive(Debug, Clone)]
pub enum Source {
    Path(PathBuf),
    Entry(CustodyEntry),
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::Path(path)
    }
}

impl From<&Path> for Source {
    fn from(path: &Path) -> Self {
        Source::Path(path.to_path_buf())
    }
}

impl From<CustodyEntry> for Source {
    fn from(entry: CustodyEntry) -> Self {
        Source::Entry(entry)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Path(path) => path.display().fmt(f),
            Source::Entry(entry) => entry.fmt(f),
        }
    }
}
