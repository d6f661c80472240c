use std::path::{Component, Path, PathBuf};

use either::Either;

use crate::error::{Error, Result};
use crate::settings::{ContextDir, Dirs};
use crate::util::PathExt;

use super::matcher::{RegexWitness, Witness};

/// Where a directory calculator re-roots its outputs: a named context
/// directory, or an explicit path.
pub type Dest = Either<ContextDir, PathBuf>;

/// Local stand-in for `Into<Dest>`: `Dest` is a type alias for a foreign
/// `Either`, so the orphan rules forbid `impl From<PathBuf> for Dest` and
/// `impl From<&Path> for Dest` directly.
pub trait IntoDest {
    fn into_dest(self) -> Dest;
}

impl IntoDest for ContextDir {
    fn into_dest(self) -> Dest {
        Either::Left(self)
    }
}

impl IntoDest for PathBuf {
    fn into_dest(self) -> Dest {
        Either::Right(self)
    }
}

impl IntoDest for &Path {
    fn into_dest(self) -> Dest {
        Either::Right(self.to_path_buf())
    }
}

type RelTransform = Box<dyn Fn(&Path) -> PathBuf>;

/// Computes an output path from an input path and the match witness.
pub enum PathCalc {
    Dir(DirCalc),
    WebIndex(WebIndexCalc),
    /// The bare-path form: place the output here verbatim, whatever the
    /// input was.
    Fixed(PathBuf),
    Func(Box<dyn Fn(&Dirs, &Path, &Witness) -> Result<PathBuf>>),
}

impl PathCalc {
    pub fn func<F>(f: F) -> PathCalc
        where F: Fn(&Dirs, &Path, &Witness) -> Result<PathBuf> + 'static
    {
        PathCalc::Func(Box::new(f))
    }

    pub fn output_path(&self, dirs: &Dirs, path: &Path, witness: &Witness) -> Result<PathBuf> {
        match self {
            PathCalc::Dir(calc) => calc.output_path(dirs, path, witness),
            PathCalc::WebIndex(calc) => calc.output_path(dirs, path, witness),
            PathCalc::Fixed(fixed) => Ok(fixed.clone()),
            PathCalc::Func(f) => f(dirs, path, witness),
        }
    }
}

impl From<DirCalc> for PathCalc {
    fn from(calc: DirCalc) -> Self {
        PathCalc::Dir(calc)
    }
}

impl From<WebIndexCalc> for PathCalc {
    fn from(calc: WebIndexCalc) -> Self {
        PathCalc::WebIndex(calc)
    }
}

impl From<PathBuf> for PathCalc {
    fn from(path: PathBuf) -> Self {
        PathCalc::Fixed(path)
    }
}

/// Re-root the input path under a destination directory, optionally swapping
/// its extension and transforming the relative part. When the matcher
/// produced capture groups, `stem` and `ext` steer the extension swap, which
/// makes compound extensions like `.tar.gz` workable.
pub struct DirCalc {
    dest: Dest,
    ext: Option<String>,
    transform: Option<RelTransform>,
}

impl DirCalc {
    pub fn new(dest: impl IntoDest) -> Self {
        DirCalc { dest: dest.into_dest(), ext: None, transform: None }
    }

    /// Shorthand for targeting the output directory.
    pub fn output() -> Self {
        DirCalc::new(ContextDir::Output)
    }

    /// Shorthand for targeting the working directory.
    pub fn working() -> Self {
        DirCalc::new(ContextDir::Working)
    }

    /// Replace the extension of computed paths. Dotted spelling: `".html"`.
    pub fn ext(mut self, ext: &str) -> Self {
        self.ext = Some(ext.to_string());
        self
    }

    /// Rewrite the relative path before it is re-rooted.
    pub fn transform<F>(mut self, f: F) -> Self
        where F: Fn(&Path) -> PathBuf + 'static
    {
        self.transform = Some(Box::new(f));
        self
    }

    fn output_path(&self, dirs: &Dirs, path: &Path, witness: &Witness) -> Result<PathBuf> {
        let transform = self.transform.as_deref();
        to_dir(&self.dest, self.ext.as_deref(), transform, dirs, path, witness)
    }
}

/// A [`DirCalc`] that additionally nests outputs into an index structure, so
/// URLs can omit the file name: `a/b.c` becomes `a/b/index.c`, while an
/// existing `a/index.c` is left alone.
pub struct WebIndexCalc {
    dest: Dest,
    ext: Option<String>,
    transform: Option<RelTransform>,
    index_base: String,
}

impl WebIndexCalc {
    pub fn new(dest: impl IntoDest) -> Self {
        WebIndexCalc {
            dest: dest.into_dest(),
            ext: None,
            transform: None,
            index_base: "index".into(),
        }
    }

    pub fn ext(mut self, ext: &str) -> Self {
        self.ext = Some(ext.to_string());
        self
    }

    pub fn transform<F>(mut self, f: F) -> Self
        where F: Fn(&Path) -> PathBuf + 'static
    {
        self.transform = Some(Box::new(f));
        self
    }

    pub fn index_base(mut self, base: &str) -> Self {
        self.index_base = base.to_string();
        self
    }

    fn output_path(&self, dirs: &Dirs, path: &Path, witness: &Witness) -> Result<PathBuf> {
        let composed = |rel: &Path| -> PathBuf {
            let rel = match &self.transform {
                Some(f) => f(rel),
                None => rel.to_path_buf(),
            };

            web_transform(&rel, &self.index_base)
        };

        to_dir(&self.dest, self.ext.as_deref(), Some(&composed), dirs, path, witness)
    }
}

fn web_transform(path: &Path, index_base: &str) -> PathBuf {
    match path.file_stem() {
        Some(stem) if stem.to_string_lossy() == index_base => path.to_path_buf(),
        _ => {
            let nested = path.replace_extension("").join(index_base);
            match path.extension() {
                Some(ext) => nested.with_extension(ext),
                None => nested,
            }
        }
    }
}

fn to_dir(
    dest: &Dest,
    ext: Option<&str>,
    transform: Option<&dyn Fn(&Path) -> PathBuf>,
    dirs: &Dirs,
    path: &Path,
    witness: &Witness,
) -> Result<PathBuf> {
    let trimmed = match (ext, witness) {
        (Some(_), Witness::Regex(w)) => trim_ext_prefix(path, w)?,
        _ => path.to_path_buf(),
    };

    let rel = relative_base(dirs, &trimmed, witness)?;
    let rel = match transform {
        Some(f) => f(&rel),
        None => rel,
    };

    let root: &Path = match dest {
        Either::Left(dir) => &dirs[*dir],
        Either::Right(path) => path,
    };

    let out = rebase(root, &rel);
    Ok(match ext {
        Some(ext) => out.replace_extension(ext),
        None => out,
    })
}

/// Append the relative part onto the destination root. A user transform may
/// hand back a rooted or dotted path; only normal components survive, so a
/// computed output can never climb out of its destination directory.
fn rebase(root: &Path, rel: &Path) -> PathBuf {
    let mut out = root.to_path_buf();
    for component in rel.components() {
        if let Component::Normal(part) = component {
            out.push(part);
        }
    }

    out
}

/// Strip explicitly matched extension information before the swap, so a
/// matched `.tar.gz` is replaced whole rather than just its `.gz` half.
fn trim_ext_prefix(path: &Path, witness: &RegexWitness) -> Result<PathBuf> {
    if let Some(stem) = witness.group("stem") {
        // A stem is a file name fragment; patterns capturing across
        // directories are rule bugs, not paths to build.
        if stem.contains('/') {
            return Err(Error::rule(format!(
                "matched stem group {stem:?} spans directories in {}",
                path.display(),
            )));
        }

        return Ok(path.replace_stem(stem));
    }

    Ok(match witness.group("ext") {
        Some(ext) if !ext.is_empty() => path.strip_name_suffix(ext),
        _ => path.to_path_buf(),
    })
}

/// The input path relative to the directory it belongs to: the witness's
/// parent directory when one was recorded, otherwise the input directory
/// with a working-directory fallback.
fn relative_base(dirs: &Dirs, path: &Path, witness: &Witness) -> Result<PathBuf> {
    if let Witness::Regex(w) = witness {
        if let Some(dir) = w.parent_dir() {
            if let Ok(rel) = path.strip_prefix(&dirs[dir]) {
                return Ok(rel.to_path_buf());
            }
        }
    }

    let rel = path
        .strip_prefix(&dirs.input)
        .or_else(|_| path.strip_prefix(&dirs.working));

    match rel {
        Ok(rel) => Ok(rel.to_path_buf()),
        Err(_) => Err(Error::rule(format!(
            "input path {} lies outside the input and working directories",
            path.display(),
        ))),
    }
}
