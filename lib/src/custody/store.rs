use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use std::fs;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};

use crate::checksum::checksum;
use crate::error::{Error, Result};
use crate::settings::{Dirs, Settings};
use crate::util::{ensure_parent, prune_empty_dirs};

use super::entry::{CustodyEntry, MetaRecord, Source, GLOB_MANIFEST_KIND, PATH_KIND};

/// Output key → source key → the full list of output keys that edge-group
/// produced. The inner list makes fan-out recoverable from any single output.
pub type Graph = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// Artifact key → most recent custody record.
pub type MetaStore = BTreeMap<String, MetaRecord>;

/// A freshness predicate for one custody entry kind: `true` means the stored
/// entry still describes the current state of the world.
pub type Checker = Box<dyn Fn(&Dirs, &CustodyEntry) -> Result<bool>>;

/// The verdict of a freshness check.
#[derive(Debug, Clone, PartialEq)]
pub enum Freshness {
    Stale(String),
    Fresh,
}

impl Freshness {
    fn stale(reason: impl Into<String>) -> Self {
        Freshness::Stale(reason.into())
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Freshness::Stale(_))
    }

    pub fn reason(&self) -> &str {
        match self {
            Freshness::Stale(reason) => reason,
            Freshness::Fresh => "cached",
        }
    }
}

/// On-disk cache layout: three sections, each with sorted keys, so that a
/// fixed in-memory state always serializes to the same bytes.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    parameters: BTreeMap<String, Json>,
    #[serde(default)]
    graph: Graph,
    #[serde(default)]
    meta: MetaStore,
}

/// Keeper of the chain of custody: which sources produced which outputs,
/// what those artifacts looked like when they were last touched, and whether
/// any of it still holds.
pub struct Custodian {
    dirs: Option<Dirs>,
    quiet: bool,
    checkers: FxHashMap<Arc<str>, Checker>,
    parameters: BTreeMap<String, Json>,
    prior_parameters: BTreeMap<String, Json>,
    stale_parameters: bool,
    graph: Graph,
    prior_graph: Graph,
    meta: MetaStore,
    prior_meta: MetaStore,
}

impl Default for Custodian {
    fn default() -> Self {
        Custodian::new()
    }
}

impl Custodian {
    pub fn new() -> Self {
        let mut custodian = Custodian {
            dirs: None,
            quiet: false,
            checkers: FxHashMap::default(),
            parameters: BTreeMap::new(),
            prior_parameters: BTreeMap::new(),
            // Until a cache proves otherwise, everything is stale.
            stale_parameters: true,
            graph: Graph::new(),
            prior_graph: Graph::new(),
            meta: MetaStore::new(),
            prior_meta: MetaStore::new(),
        };

        custodian.register_kind(PATH_KIND, check_path);
        custodian.register_kind(GLOB_MANIFEST_KIND, check_glob_manifest);
        custodian
    }

    /// Attach the custodian to a resolved build. Captures the settings into
    /// the cache parameters and enables key genericization.
    pub fn bind(&mut self, settings: &Settings, quiet: bool) {
        self.dirs = Some(settings.dirs().clone());
        self.quiet = quiet;
        for (key, value) in settings.parameters() {
            self.parameters.insert(key, value);
        }
    }

    /// Add a caller-defined cache parameter. Changing its value between runs
    /// invalidates the whole cache.
    pub fn add_parameter(&mut self, key: impl Into<String>, value: Json) {
        self.parameters.insert(key.into(), value);
    }

    /// Install the freshness predicate for a custody entry kind, replacing
    /// any existing one.
    pub fn register_kind<F>(&mut self, kind: &str, checker: F)
        where F: Fn(&Dirs, &CustodyEntry) -> Result<bool> + 'static
    {
        self.checkers.insert(Arc::from(kind), Box::new(checker));
    }

    /// Install a freshness predicate only when the kind has none yet. The
    /// form transforms use, so several instances can register the same kind.
    pub fn register_kind_if_absent<F>(&mut self, kind: &str, checker: F)
        where F: Fn(&Dirs, &CustodyEntry) -> Result<bool> + 'static
    {
        if !self.checkers.contains_key(kind) {
            self.register_kind(kind, checker);
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn meta_store(&self) -> &MetaStore {
        &self.meta
    }

    pub fn parameters(&self) -> &BTreeMap<String, Json> {
        &self.parameters
    }

    fn dirs(&self) -> Result<&Dirs> {
        match &self.dirs {
            Some(dirs) => Ok(dirs),
            None => Err(Error::custody("custodian is not bound to a build")),
        }
    }

    /// The custody key for `path`. Paths escaping every context directory
    /// are a rule error.
    pub fn key_for(&self, path: &Path) -> Result<String> {
        let dirs = self.dirs()?;
        match dirs.genericize(path) {
            Some(key) => Ok(key),
            None => Err(Error::rule(format!(
                "path {} escapes the build directories (input {}, output {}, working {})",
                path.display(),
                dirs.input.display(),
                dirs.output.display(),
                dirs.working.display(),
            ))),
        }
    }

    /// Build a `path`-kind entry for a file: content hash plus the stat
    /// fields the default checker uses to short-circuit hashing.
    pub fn entry_from_path(&self, path: &Path) -> Result<CustodyEntry> {
        let key = self.key_for(path)?;
        Ok(CustodyEntry::new(PATH_KIND, key, stat_meta(path, checksum(path)?)?))
    }

    fn ensure_entry(&self, source: &Source) -> Result<CustodyEntry> {
        match source {
            Source::Path(path) => self.entry_from_path(path),
            Source::Entry(entry) => Ok(entry.clone()),
        }
    }

    /// Build a `glob_manifest` entry recording the current set of files
    /// matching `pattern` under `parent`. A transform that packs "every file
    /// matching X" declares this as a source so additions and removals
    /// trigger a rerun even though no recorded file changed.
    pub fn glob_manifest_entry(&self, parent: &Path, pattern: &str) -> Result<CustodyEntry> {
        let dirs = self.dirs()?;
        let prefix = self.key_for(parent)?;
        let files = resolve_glob(dirs, parent, pattern)?;

        // ':' cannot appear in a glob, so it cleanly splits prefix from
        // pattern on the way back in.
        Ok(CustodyEntry::new(
            GLOB_MANIFEST_KIND,
            format!("{prefix}:{pattern}"),
            json!({ "files": files }),
        ))
    }

    /// Read a prior cache file. A missing, unreadable, or corrupt file is
    /// not an error: the custodian starts empty and the build runs in full.
    /// Mismatched parameters likewise discard the prior data.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                self.warn(&format!("unreadable custody cache {} ({e}); rebuilding", path.display()));
                return Ok(());
            }
        };

        let cache: CacheFile = match serde_json::from_str(&text) {
            Ok(cache) => cache,
            Err(e) => {
                self.warn(&format!("corrupt custody cache {} ({e}); rebuilding", path.display()));
                return Ok(());
            }
        };

        self.prior_parameters = cache.parameters;
        self.stale_parameters = self.parameters != self.prior_parameters;
        if self.stale_parameters {
            self.warn("build parameters changed; ignoring prior custody data");
        } else {
            self.prior_graph = cache.graph;
            self.prior_meta = cache.meta;
        }

        Ok(())
    }

    /// Atomically write the current graph and meta store. A failed save is
    /// fatal, but a half-written file can never clobber a valid one: the
    /// JSON goes to a sibling temporary and is renamed into place.
    pub fn save(&self, path: &Path) -> Result<()> {
        let cache = CacheFile {
            parameters: self.parameters.clone(),
            graph: self.graph.clone(),
            meta: self.meta.clone(),
        };

        let mut text = serde_json::to_string_pretty(&cache)
            .map_err(|e| Error::custody(format!("cannot serialize custody cache: {e}")))?;
        text.push('\n');

        ensure_parent(path)?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut staged = tempfile::NamedTempFile::new_in(dir)
            .map_err(|source| Error::io("stage custody cache in", dir, source))?;

        staged.write_all(text.as_bytes())
            .map_err(|source| Error::io("write custody cache to", path, source))?;

        staged.persist(path)
            .map_err(|e| Error::io("replace custody cache", path, e.error))?;

        Ok(())
    }

    fn run_checker(&self, entry: &CustodyEntry) -> Result<bool> {
        let checker = self.checkers.get(entry.kind()).ok_or_else(|| Error::custody(format!(
            "no checker registered for custody kind {:?} (key {})",
            entry.kind(),
            entry.key(),
        )))?;

        checker(self.dirs()?, entry)
    }

    /// Whether the artifact behind `key` still matches its recorded
    /// fingerprint. Unknown keys are never current.
    pub fn check_prior(&self, key: &str) -> Result<bool> {
        match self.prior_meta.get(key) {
            Some(record) => self.run_checker(&record.entry(key)),
            None => Ok(false),
        }
    }

    /// Decide whether a transform with the given sources and outputs must
    /// rerun, and why. The verdict consults the prior run's graph, so hidden
    /// dependencies a transform declared last time (templates, manifests,
    /// URLs) participate even though the caller only knows the input file.
    pub fn refresh_needed(&self, sources: &[Source], outputs: &[PathBuf]) -> Result<Freshness> {
        if self.stale_parameters {
            return Ok(Freshness::stale("stale parameters"));
        }

        for output in outputs {
            if !output.exists() {
                return Ok(Freshness::stale(format!("missing output ({})", output.display())));
            }
        }

        let mut upstreams = BTreeSet::new();
        for output in outputs {
            if let Some(edges) = self.prior_graph.get(&self.key_for(output)?) {
                upstreams.extend(edges.keys().cloned());
            }
        }

        for source in sources {
            let key = match source {
                Source::Path(path) => self.key_for(path)?,
                Source::Entry(entry) => entry.key().to_string(),
            };

            if !upstreams.contains(&key) {
                return Ok(Freshness::stale(format!("missing upstream record ({source})")));
            }
        }

        for key in &upstreams {
            if !self.check_prior(key)? {
                return Ok(Freshness::stale(format!("stale upstream ({key})")));
            }
        }

        for output in outputs {
            let key = self.key_for(output)?;
            match self.prior_meta.get(&key) {
                Some(record) if self.run_checker(&record.entry(&key))? => {}
                _ => return Ok(Freshness::stale(format!("modified output ({key})"))),
            }
        }

        Ok(Freshness::Fresh)
    }

    /// Record a successful run: fingerprint every source and output, and add
    /// graph edges from every output to every source carrying the complete
    /// output list.
    pub fn add_step(&mut self, sources: &[Source], outputs: &[PathBuf], reason: &str) -> Result<()> {
        self.log_step(sources, outputs, Some(reason));

        let mut keys = Vec::with_capacity(outputs.len());
        for output in outputs {
            let entry = self.entry_from_path(output)?;
            keys.push(entry.key().to_string());
            self.meta.insert(entry.key().to_string(), MetaRecord::from(&entry));
        }

        for source in sources {
            let entry = self.ensure_entry(source)?;
            self.meta.insert(entry.key().to_string(), MetaRecord::from(&entry));
            for key in &keys {
                self.graph
                    .entry(key.clone())
                    .or_default()
                    .insert(entry.key().to_string(), keys.clone());
            }
        }

        Ok(())
    }

    /// Record a skipped run: the prior edges and fingerprints are carried
    /// into the current graph untouched, except that path outputs get a
    /// fresh stat (no rehash). Returns the outputs recorded by the prior
    /// run, which stand in for the transform's results downstream.
    pub fn skip_step(&mut self, source: &Path, outputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let dirs = self.dirs()?.clone();
        let source_key = self.key_for(source)?;
        let first = match outputs.first() {
            Some(first) => first,
            None => return Err(Error::custody("a skipped step must have at least one output")),
        };

        let prior_keys = self.prior_graph
            .get(&self.key_for(first)?)
            .and_then(|edges| edges.get(&source_key))
            .cloned()
            .ok_or_else(|| Error::custody(format!(
                "prior custody record for {source_key} over {} vanished during skip",
                first.display(),
            )))?;

        let mut prior_outputs = Vec::with_capacity(prior_keys.len());
        for key in &prior_keys {
            let path = dirs.degenericize(key).ok_or_else(|| Error::custody(format!(
                "prior output key {key:?} does not resolve to a build directory",
            )))?;
            prior_outputs.push(path);
        }

        self.log_skip(source, &prior_outputs);

        if let Some(record) = self.prior_meta.get(&source_key).cloned() {
            self.meta.entry(source_key).or_insert(record);
        }

        for (key, path) in prior_keys.iter().zip(&prior_outputs) {
            if let Some(edges) = self.prior_graph.get(key).cloned() {
                for upstream in edges.keys() {
                    if let Some(record) = self.prior_meta.get(upstream).cloned() {
                        self.meta.entry(upstream.clone()).or_insert(record);
                    }
                }

                self.graph.entry(key.clone()).or_default().extend(edges);
            }

            if let Some(record) = self.prior_meta.get(key) {
                let mut record = record.clone();
                if record.kind() == PATH_KIND {
                    restamp(&mut record, path);
                }

                self.meta.insert(key.clone(), record);
            }
        }

        Ok(prior_outputs)
    }

    /// Delete outputs the prior run produced but this run did not, pruning
    /// directories they leave empty. Returns the removed paths.
    pub fn remove_orphans(&mut self) -> Result<Vec<PathBuf>> {
        let dirs = self.dirs()?.clone();
        let orphans: Vec<String> = self.prior_graph.keys()
            .filter(|key| !self.graph.contains_key(*key))
            .filter(|key| {
                key.starts_with("output_dir/") || key.starts_with("working_dir/")
            })
            .cloned()
            .collect();

        let mut removed = vec![];
        for key in orphans {
            let path = match dirs.degenericize(&key) {
                Some(path) => path,
                None => continue,
            };

            if path.is_file() {
                fs::remove_file(&path)
                    .map_err(|source| Error::io("remove orphaned output", &path, source))?;

                if let Some(parent) = path.parent() {
                    let root = match key.starts_with("output_dir/") {
                        true => &dirs.output,
                        false => &dirs.working,
                    };
                    prune_empty_dirs(parent, root);
                }

                removed.push(path);
            }
        }

        Ok(removed)
    }

    fn log_step(&self, sources: &[Source], outputs: &[PathBuf], reason: Option<&str>) {
        if self.quiet {
            return;
        }

        let outs = outputs.iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");

        let line = match sources {
            [single] => format!("{single} => {outs}"),
            many => {
                let srcs = many.iter()
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{{{srcs}}} => {outs}")
            }
        };

        match reason {
            Some(reason) => println!("{reason}: {line}"),
            None => println!("skipped: {line}"),
        }
    }

    fn log_skip(&self, source: &Path, outputs: &[PathBuf]) {
        let sources = [Source::from(source)];
        self.log_step(&sources, outputs, None);
    }

    fn warn(&self, message: &str) {
        if !self.quiet {
            eprintln!("warning: {message}");
        }
    }
}

fn stat_meta(path: &Path, sha1: String) -> Result<Json> {
    let stat = fs::metadata(path).map_err(|source| Error::io("stat", path, source))?;

    let m_time = stat.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);

    Ok(json!({ "sha1": sha1, "m_time": m_time, "size": stat.len() }))
}

fn restamp(record: &mut MetaRecord, path: &Path) {
    let stat = match fs::metadata(path) {
        Ok(stat) => stat,
        Err(_) => return,
    };

    if let Some(meta) = record.1.as_object_mut() {
        let m_time = stat.modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        meta.insert("m_time".into(), json!(m_time));
        meta.insert("size".into(), json!(stat.len()));
    }
}

/// Default checker for `path` entries. The stat fields short-circuit the
/// hash: an identical m_time and size is taken as unchanged content.
fn check_path(dirs: &Dirs, entry: &CustodyEntry) -> Result<bool> {
    let path = match dirs.degenericize(entry.key()) {
        Some(path) => path,
        None => return Ok(false),
    };

    if !path.exists() {
        return Ok(false);
    }

    let recorded = entry.get("sha1").and_then(|v| v.as_str()).unwrap_or("");
    if let Ok(stat) = fs::metadata(&path) {
        let m_time = stat.modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs_f64());

        let same_mtime = m_time.is_some()
            && entry.get("m_time").and_then(|v| v.as_f64()) == m_time;
        let same_size = entry.get("size").and_then(|v| v.as_u64()) == Some(stat.len());

        if same_mtime && same_size {
            return Ok(true);
        }
    }

    Ok(checksum(&path)? == recorded)
}

/// Default checker for `glob_manifest` entries: the glob is re-resolved and
/// compared against the recorded file list.
fn check_glob_manifest(dirs: &Dirs, entry: &CustodyEntry) -> Result<bool> {
    let (prefix, pattern) = match entry.key().rsplit_once(':') {
        Some(parts) => parts,
        None => return Ok(false),
    };

    let parent = match dirs.degenericize(prefix) {
        Some(parent) => parent,
        None => return Ok(false),
    };

    let current = resolve_glob(dirs, &parent, pattern)?;
    let recorded: Vec<&str> = entry.get("files")
        .and_then(|v| v.as_array())
        .map(|files| files.iter().filter_map(|f| f.as_str()).collect())
        .unwrap_or_default();

    Ok(current == recorded)
}

fn resolve_glob(dirs: &Dirs, parent: &Path, pattern: &str) -> Result<Vec<String>> {
    let full = parent.join(pattern);
    let matches = glob::glob(&full.to_string_lossy())
        .map_err(|e| Error::custody(format!("invalid glob pattern {pattern:?}: {e}")))?;

    let mut files = vec![];
    for path in matches {
        let path = path.map_err(|e| {
            let at = e.path().to_path_buf();
            Error::io("read", at, e.into_error())
        })?;
        if path.is_file() {
            let key = dirs.genericize(&path)
                .unwrap_or_else(|| path.to_string_lossy().into_owned());
            files.push(key);
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;

    struct Fixture {
        _tmp: tempfile::TempDir,
        settings: Settings,
        custodian: Custodian,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("input");
        fs::create_dir_all(&input).unwrap();
        let settings = Settings::builder(&input)
            .output(tmp.path().join("output"))
            .working(tmp.path().join("working"))
            .custody_cache(tmp.path().join("custody.json"))
            .build()
            .unwrap();

        let mut custodian = Custodian::new();
        custodian.bind(&settings, true);
        Fixture { _tmp: tmp, settings, custodian }
    }

    fn write(fixture: &Fixture, dir: crate::settings::ContextDir, name: &str, text: &str) -> PathBuf {
        let path = fixture.settings[dir].join(name);
        ensure_parent(&path).unwrap();
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn entry_from_path_records_fingerprint() {
        let fx = fixture();
        let path = write(&fx, crate::settings::ContextDir::Input, "a.md", "hello");

        let entry = fx.custodian.entry_from_path(&path).unwrap();
        assert_eq!(entry.kind(), PATH_KIND);
        assert_eq!(entry.key(), "input_dir/a.md");
        assert_eq!(
            entry.get("sha1").unwrap().as_str().unwrap(),
            crate::checksum::checksum_bytes(b"hello"),
        );
        assert_eq!(entry.get("size").unwrap().as_u64().unwrap(), 5);
        assert!(entry.get("m_time").unwrap().as_f64().unwrap() > 0.0);
    }

    #[test]
    fn add_step_builds_fan_out_edges() {
        use crate::settings::ContextDir::*;
        let mut fx = fixture();
        let input = write(&fx, Input, "photo.jpg", "raw");
        let full = write(&fx, Output, "photo/full.jpg", "full");
        let thumb = write(&fx, Output, "photo/thumb.jpg", "thumb");

        fx.custodian
            .add_step(&[Source::from(input.as_path())], &[full, thumb], "missing output")
            .unwrap();

        let graph = fx.custodian.graph();
        let expected = vec![
            "output_dir/photo/full.jpg".to_string(),
            "output_dir/photo/thumb.jpg".to_string(),
        ];
        assert_eq!(graph["output_dir/photo/full.jpg"]["input_dir/photo.jpg"], expected);
        assert_eq!(graph["output_dir/photo/thumb.jpg"]["input_dir/photo.jpg"], expected);

        // Edge consistency: every source in the graph has a meta record.
        for edges in graph.values() {
            for key in edges.keys() {
                assert!(fx.custodian.meta_store().contains_key(key), "missing meta for {key}");
            }
        }
    }

    #[test]
    fn save_is_deterministic_and_loads_back() {
        use crate::settings::ContextDir::*;
        let mut fx = fixture();
        let input = write(&fx, Input, "a.md", "text");
        let output = write(&fx, Output, "a.html", "<p>text</p>");
        fx.custodian
            .add_step(&[Source::from(input.as_path())], &[output], "missing output")
            .unwrap();

        let cache = fx.settings.custody_cache().unwrap().to_path_buf();
        fx.custodian.save(&cache).unwrap();
        let first = fs::read(&cache).unwrap();
        fx.custodian.save(&cache).unwrap();
        let second = fs::read(&cache).unwrap();
        assert_eq!(first, second);

        let mut reloaded = Custodian::new();
        reloaded.bind(&fx.settings, true);
        reloaded.load(&cache).unwrap();
        assert!(!reloaded.stale_parameters);
        assert_eq!(&reloaded.prior_graph, fx.custodian.graph());
        assert_eq!(&reloaded.prior_meta, fx.custodian.meta_store());
    }

    #[test]
    fn corrupt_cache_degrades_to_full_rebuild() {
        let fx = fixture();
        let cache = fx.settings.custody_cache().unwrap().to_path_buf();
        fs::write(&cache, "{ not json").unwrap();

        let mut custodian = Custodian::new();
        custodian.bind(&fx.settings, true);
        custodian.load(&cache).unwrap();
        assert!(custodian.stale_parameters);
        assert!(custodian.prior_graph.is_empty());
    }

    #[test]
    fn parameter_mismatch_discards_prior_data() {
        use crate::settings::ContextDir::*;
        let mut fx = fixture();
        let input = write(&fx, Input, "a.md", "text");
        let output = write(&fx, Output, "a.html", "x");
        fx.custodian
            .add_step(&[Source::from(input.as_path())], &[output], "missing output")
            .unwrap();

        let cache = fx.settings.custody_cache().unwrap().to_path_buf();
        fx.custodian.save(&cache).unwrap();

        let mut next = Custodian::new();
        next.bind(&fx.settings, true);
        next.add_parameter("flavor", json!("bitter"));
        next.load(&cache).unwrap();
        assert!(next.stale_parameters);
        assert!(next.prior_graph.is_empty());

        let verdict = next.refresh_needed(&[], &[]).unwrap();
        assert_eq!(verdict, Freshness::Stale("stale parameters".into()));
    }

    #[test]
    fn refresh_walks_the_staleness_ladder() {
        use crate::settings::ContextDir::*;
        let mut fx = fixture();
        let input = write(&fx, Input, "a.md", "text");
        let output = write(&fx, Output, "a.html", "rendered");
        let sources = [Source::from(input.as_path())];
        let outputs = [output.clone()];

        // Nothing recorded yet: treated as fully stale via parameters.
        assert!(fx.custodian.refresh_needed(&sources, &outputs).unwrap().is_stale());

        fx.custodian.add_step(&sources, &outputs, "missing output").unwrap();
        let cache = fx.settings.custody_cache().unwrap().to_path_buf();
        fx.custodian.save(&cache).unwrap();

        let mut next = Custodian::new();
        next.bind(&fx.settings, true);
        next.load(&cache).unwrap();

        assert_eq!(next.refresh_needed(&sources, &outputs).unwrap(), Freshness::Fresh);
        assert_eq!(next.refresh_needed(&sources, &outputs).unwrap().reason(), "cached");

        // Missing output.
        fs::remove_file(&output).unwrap();
        let verdict = next.refresh_needed(&sources, &outputs).unwrap();
        assert!(verdict.reason().starts_with("missing output"));
        fs::write(&output, "rendered").unwrap();

        // Output modified out from under the build. Rewriting restored the
        // bytes, so only the tampered case below is stale.
        fs::write(&output, "tampered").unwrap();
        let verdict = next.refresh_needed(&sources, &outputs).unwrap();
        assert!(verdict.reason().starts_with("modified output"), "got {verdict:?}");
        fs::write(&output, "rendered").unwrap();

        // Changed upstream.
        fs::write(&input, "text v2").unwrap();
        let verdict = next.refresh_needed(&sources, &outputs).unwrap();
        assert!(verdict.reason().starts_with("stale upstream"), "got {verdict:?}");

        // Unknown source.
        let other = write(&fx, Input, "b.md", "other");
        let verdict = next
            .refresh_needed(&[Source::from(other.as_path())], &outputs)
            .unwrap();
        assert!(verdict.reason().starts_with("missing upstream record"), "got {verdict:?}");
    }

    #[test]
    fn skip_step_restores_prior_edges_without_rehash() {
        use crate::settings::ContextDir::*;
        let mut fx = fixture();
        let input = write(&fx, Input, "a.md", "text");
        let output = write(&fx, Output, "a.html", "rendered");
        let sources = [Source::from(input.as_path())];
        fx.custodian.add_step(&sources, &[output.clone()], "missing output").unwrap();

        let cache = fx.settings.custody_cache().unwrap().to_path_buf();
        fx.custodian.save(&cache).unwrap();

        let mut next = Custodian::new();
        next.bind(&fx.settings, true);
        next.load(&cache).unwrap();

        let restored = next.skip_step(&input, &[output.clone()]).unwrap();
        assert_eq!(restored, vec![output]);
        assert_eq!(next.graph(), fx.custodian.graph());
        assert_eq!(
            next.meta_store()["output_dir/a.html"].meta()["sha1"],
            fx.custodian.meta_store()["output_dir/a.html"].meta()["sha1"],
        );
    }

    #[test]
    fn glob_manifest_goes_stale_on_membership_change() {
        use crate::settings::ContextDir::*;
        let fx = fixture();
        write(&fx, Input, "pack/a.py", "a");
        write(&fx, Input, "pack/b.py", "b");
        let parent = fx.settings[Input].join("pack");

        let entry = fx.custodian.glob_manifest_entry(&parent, "*.py").unwrap();
        assert_eq!(entry.key(), "input_dir/pack:*.py");
        assert_eq!(
            entry.get("files").unwrap().as_array().unwrap().len(),
            2,
        );

        let dirs = fx.custodian.dirs().unwrap().clone();
        assert!(check_glob_manifest(&dirs, &entry).unwrap());

        // Adding a file changes membership but no recorded content.
        write(&fx, Input, "pack/c.py", "c");
        assert!(!check_glob_manifest(&dirs, &entry).unwrap());

        fs::remove_file(fx.settings[Input].join("pack/c.py")).unwrap();
        assert!(check_glob_manifest(&dirs, &entry).unwrap());
    }

    #[test]
    fn orphans_are_removed_with_their_empty_dirs() {
        use crate::settings::ContextDir::*;
        let mut fx = fixture();
        let input = write(&fx, Input, "a.md", "text");
        let output = write(&fx, Output, "posts/a.html", "rendered");
        fx.custodian
            .add_step(&[Source::from(input.as_path())], &[output.clone()], "missing output")
            .unwrap();

        let cache = fx.settings.custody_cache().unwrap().to_path_buf();
        fx.custodian.save(&cache).unwrap();

        // Next run produces nothing: the prior output is an orphan.
        let mut next = Custodian::new();
        next.bind(&fx.settings, true);
        next.load(&cache).unwrap();
        let removed = next.remove_orphans().unwrap();

        assert_eq!(removed, vec![output.clone()]);
        assert!(!output.exists());
        assert!(!output.parent().unwrap().exists());
        assert!(fx.settings[Output].exists());
    }
}
