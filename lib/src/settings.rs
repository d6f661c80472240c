use std::collections::BTreeMap;
use std::fmt;
use std::ops::Index;
use std::path::{Path, PathBuf};

use serde_json::Value as Json;
use tempfile::TempDir;

use crate::error::{Error, Result};
use crate::util::posix_str;

/// The named directories a build runs across. The names double as the
/// virtual prefixes used in custody keys, which keeps the cache portable
/// across machines with different directory roots.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContextDir {
    Input,
    Output,
    Working,
}

impl ContextDir {
    pub const ALL: [ContextDir; 3] = [ContextDir::Input, ContextDir::Output, ContextDir::Working];

    pub fn key(self) -> &'static str {
        match self {
            ContextDir::Input => "input_dir",
            ContextDir::Output => "output_dir",
            ContextDir::Working => "working_dir",
        }
    }

    pub fn from_key(key: &str) -> Option<ContextDir> {
        match key {
            "input_dir" => Some(ContextDir::Input),
            "output_dir" => Some(ContextDir::Output),
            "working_dir" => Some(ContextDir::Working),
            _ => None,
        }
    }
}

impl fmt::Display for ContextDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// The resolved context directories, cheap to clone and hand to matchers,
/// path calculators, and custody checkers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dirs {
    pub input: PathBuf,
    pub output: PathBuf,
    pub working: PathBuf,
}

impl Dirs {
    pub fn get(&self, dir: ContextDir) -> &Path {
        match dir {
            ContextDir::Input => &self.input,
            ContextDir::Output => &self.output,
            ContextDir::Working => &self.working,
        }
    }

    /// The context directory `path` lies under, with the remainder of the
    /// path relative to it. When directories nest (the default output
    /// directory lives inside the input directory), the most specific root
    /// wins.
    pub fn classify<'p>(&self, path: &'p Path) -> Option<(ContextDir, &'p Path)> {
        let mut best: Option<(ContextDir, &Path)> = None;
        for dir in ContextDir::ALL {
            if let Ok(rel) = path.strip_prefix(self.get(dir)) {
                match best {
                    Some((_, prev)) if rel.components().count() >= prev.components().count() => {}
                    _ => best = Some((dir, rel)),
                }
            }
        }

        best
    }

    /// Convert a path into a custody key: the run-specific directory root is
    /// replaced by its virtual prefix and separators are normalized to `/`.
    /// Paths outside every context directory have no key.
    pub fn genericize(&self, path: &Path) -> Option<String> {
        let (dir, rel) = self.classify(path)?;
        if rel.as_os_str().is_empty() {
            return Some(dir.key().to_string());
        }

        Some(format!("{}/{}", dir.key(), posix_str(rel)))
    }

    /// Undo [`Dirs::genericize`], turning a custody key back into a path
    /// rooted in this run's directories.
    pub fn degenericize(&self, key: &str) -> Option<PathBuf> {
        let (prefix, rel) = match key.split_once('/') {
            Some((prefix, rel)) => (prefix, rel),
            None => (key, ""),
        };

        let root = self.get(ContextDir::from_key(prefix)?);
        match rel.is_empty() {
            true => Some(root.to_path_buf()),
            false => Some(root.join(rel)),
        }
    }
}

impl Index<ContextDir> for Dirs {
    type Output = Path;

    fn index(&self, index: ContextDir) -> &Path {
        self.get(index)
    }
}

/// Resolved build settings. Construction canonicalizes every directory,
/// creating the output and working directories if needed; when no working
/// directory is given, a per-run scratch directory is created and owned for
/// the lifetime of the settings.
#[derive(Debug)]
pub struct Settings {
    dirs: Dirs,
    custody_cache: Option<PathBuf>,
    purge_dirs: bool,
    _scratch: Option<TempDir>,
}

pub struct SettingsBuilder {
    input: PathBuf,
    output: Option<PathBuf>,
    working: Option<PathBuf>,
    custody_cache: Option<PathBuf>,
    purge_dirs: bool,
}

impl Settings {
    pub fn builder<P: AsRef<Path>>(input: P) -> SettingsBuilder {
        SettingsBuilder {
            input: input.as_ref().to_path_buf(),
            output: None,
            working: None,
            custody_cache: None,
            purge_dirs: false,
        }
    }

    pub fn dirs(&self) -> &Dirs {
        &self.dirs
    }

    pub fn custody_cache(&self) -> Option<&Path> {
        self.custody_cache.as_deref()
    }

    pub fn purge_dirs(&self) -> bool {
        self.purge_dirs
    }

    /// The settings captured into the custody cache's `parameters` section.
    /// Any change here invalidates the entire cache on load.
    pub fn parameters(&self) -> BTreeMap<String, Json> {
        let mut parameters = BTreeMap::new();
        parameters.insert("bowerbird_version".into(), Json::from(env!("CARGO_PKG_VERSION")));
        for dir in ContextDir::ALL {
            let path = self.dirs.get(dir).to_string_lossy().into_owned();
            parameters.insert(dir.key().into(), Json::from(path));
        }

        parameters
    }
}

impl Index<ContextDir> for Settings {
    type Output = Path;

    fn index(&self, index: ContextDir) -> &Path {
        self.dirs.get(index)
    }
}

impl SettingsBuilder {
    pub fn output<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.output = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn working<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.working = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn custody_cache<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.custody_cache = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn purge_dirs(mut self, purge: bool) -> Self {
        self.purge_dirs = purge;
        self
    }

    pub fn build(self) -> Result<Settings> {
        if !self.input.is_dir() {
            return Err(Error::config(format!(
                "input directory {} does not exist",
                self.input.display(),
            )));
        }

        let input = self.input
            .canonicalize()
            .map_err(|source| Error::io("canonicalize", &self.input, source))?;

        let output = resolve_dir(self.output.unwrap_or_else(|| input.join("build")))?;
        if input == output {
            return Err(Error::config(format!(
                "input and output directories must differ (both are {})",
                input.display(),
            )));
        }

        let (working, scratch) = match self.working {
            Some(path) => (resolve_dir(path)?, None),
            None => {
                let scratch = TempDir::new().map_err(|source| {
                    Error::io("create scratch directory in", std::env::temp_dir(), source)
                })?;
                (resolve_dir(scratch.path().to_path_buf())?, Some(scratch))
            }
        };

        Ok(Settings {
            dirs: Dirs { input, output, working },
            custody_cache: self.custody_cache,
            purge_dirs: self.purge_dirs,
            _scratch: scratch,
        })
    }
}

fn resolve_dir(path: PathBuf) -> Result<PathBuf> {
    std::fs::create_dir_all(&path)
        .map_err(|source| Error::io("create", &path, source))?;

    path.canonicalize()
        .map_err(|source| Error::io("canonicalize", &path, source))
}
