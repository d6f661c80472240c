use std::ops;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::RegexBuilder;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::settings::{ContextDir, Dirs};
use crate::util::posix_str;

/// The payload a matcher produces on success. Its shape is opaque to the
/// engine; path calculators inspect it for capture groups.
#[derive(Debug, Clone)]
pub enum Witness {
    Unit,
    Path(PathBuf),
    Regex(RegexWitness),
}

/// Named capture groups from a successful regex match, with the haystack
/// they index into.
#[derive(Debug, Clone)]
pub struct RegexWitness {
    text: Arc<str>,
    groups: FxHashMap<Box<str>, (usize, usize)>,
    parent_dir: Option<ContextDir>,
}

impl RegexWitness {
    /// The string the pattern matched against: the path relative to the
    /// matcher's parent directory, with `/` separators.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn group(&self, name: &str) -> Option<&str> {
        let &(start, end) = self.groups.get(name)?;
        self.text.get(start..end)
    }

    /// The directory the matcher relativized against, when it named one.
    pub fn parent_dir(&self) -> Option<ContextDir> {
        self.parent_dir
    }
}

/// A path matcher, composable with `&`, `|`, and `!`. Composition
/// short-circuits; conjunction keeps the left witness, negation produces a
/// unit witness.
pub enum Matcher {
    Regex(RegexMatcher),
    Func(Box<dyn Fn(&Dirs, &Path) -> Option<Witness>>),
    And(Box<Matcher>, Box<Matcher>),
    Or(Box<Matcher>, Box<Matcher>),
    Not(Box<Matcher>),
}

impl Matcher {
    pub fn regex(pattern: &str) -> Result<Matcher> {
        Ok(Matcher::Regex(RegexMatcher::new(pattern)?))
    }

    pub fn func<F>(f: F) -> Matcher
        where F: Fn(&Dirs, &Path) -> Option<Witness> + 'static
    {
        Matcher::Func(Box::new(f))
    }

    pub fn matches(&self, dirs: &Dirs, path: &Path) -> Option<Witness> {
        match self {
            Matcher::Regex(matcher) => matcher.matches(dirs, path),
            Matcher::Func(f) => f(dirs, path),
            Matcher::And(left, right) => {
                let witness = left.matches(dirs, path)?;
                right.matches(dirs, path)?;
                Some(witness)
            }
            Matcher::Or(left, right) => {
                left.matches(dirs, path).or_else(|| right.matches(dirs, path))
            }
            Matcher::Not(inner) => match inner.matches(dirs, path) {
                Some(_) => None,
                None => Some(Witness::Unit),
            },
        }
    }
}

impl From<RegexMatcher> for Matcher {
    fn from(matcher: RegexMatcher) -> Self {
        Matcher::Regex(matcher)
    }
}

impl ops::BitAnd for Matcher {
    type Output = Matcher;

    fn bitand(self, rhs: Matcher) -> Matcher {
        Matcher::And(Box::new(self), Box::new(rhs))
    }
}

impl ops::BitOr for Matcher {
    type Output = Matcher;

    fn bitor(self, rhs: Matcher) -> Matcher {
        Matcher::Or(Box::new(self), Box::new(rhs))
    }
}

impl ops::Not for Matcher {
    type Output = Matcher;

    fn not(self) -> Matcher {
        Matcher::Not(Box::new(self))
    }
}

/// Regex matching over path strings. With a parent directory set, paths
/// outside it never match and the pattern sees the path relative to it;
/// without one, the path is taken relative to the input directory, falling
/// back to the working directory for intermediate files.
pub struct RegexMatcher {
    regex: regex::Regex,
    parent_dir: Option<ContextDir>,
}

impl RegexMatcher {
    pub fn new(pattern: &str) -> Result<Self> {
        Self::build(pattern, false)
    }

    pub fn case_insensitive(pattern: &str) -> Result<Self> {
        Self::build(pattern, true)
    }

    fn build(pattern: &str, case_insensitive: bool) -> Result<Self> {
        // Anchor at the path head: rules write patterns like `\..*`
        // expecting them to describe the whole front of the path.
        let regex = RegexBuilder::new(&format!(r"\A(?:{pattern})"))
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|e| Error::rule(format!("invalid pattern {pattern:?}: {e}")))?;

        Ok(RegexMatcher { regex, parent_dir: None })
    }

    /// Restrict the matcher to paths under the named directory.
    pub fn under(mut self, dir: ContextDir) -> Self {
        self.parent_dir = Some(dir);
        self
    }

    pub fn matches(&self, dirs: &Dirs, path: &Path) -> Option<Witness> {
        let rel: &Path = match self.parent_dir {
            Some(dir) => path.strip_prefix(&dirs[dir]).ok()?,
            None => path
                .strip_prefix(&dirs.input)
                .or_else(|_| path.strip_prefix(&dirs.working))
                .unwrap_or(path),
        };

        let text = posix_str(rel);
        let captures = self.regex.captures(&text)?;
        let mut groups = FxHashMap::default();
        for name in self.regex.capture_names().flatten() {
            if let Some(found) = captures.name(name) {
                groups.insert(name.into(), (found.start(), found.end()));
            }
        }

        Some(Witness::Regex(RegexWitness {
            text: Arc::from(&*text),
            groups,
            parent_dir: self.parent_dir,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dirs() -> Dirs {
        Dirs {
            input: "input".into(),
            output: "output".into(),
            working: "working".into(),
        }
    }

    fn regex_witness(witness: Witness) -> RegexWitness {
        match witness {
            Witness::Regex(w) => w,
            other => panic!("expected a regex witness, got {other:?}"),
        }
    }

    #[test]
    fn matches_relative_to_input() {
        let dirs = dirs();
        let matcher = RegexMatcher::new(r".*\.html").unwrap();
        assert!(matcher.matches(&dirs, Path::new("input/foo.html")).is_some());
        assert!(matcher.matches(&dirs, Path::new("working/foo.html")).is_some());
        assert!(matcher.matches(&dirs, Path::new("input/foo.css")).is_none());
    }

    #[test]
    fn anchored_at_path_head() {
        let dirs = dirs();
        let hidden = RegexMatcher::new(r"\..*").unwrap();
        assert!(hidden.matches(&dirs, Path::new("input/.hidden")).is_some());
        assert!(hidden.matches(&dirs, Path::new("input/a.md")).is_none());
    }

    #[test]
    fn parent_dir_limits_scope() {
        let dirs = dirs();
        let pattern = r".*(?P<ext>\.j\.html)";

        let in_input = RegexMatcher::new(pattern).unwrap().under(ContextDir::Input);
        let witness = in_input.matches(&dirs, Path::new("input/foo.j.html")).unwrap();
        assert_eq!(regex_witness(witness).group("ext"), Some(".j.html"));
        assert!(in_input.matches(&dirs, Path::new("input/foo.html")).is_none());

        let in_working = RegexMatcher::new(pattern).unwrap().under(ContextDir::Working);
        assert!(in_working.matches(&dirs, Path::new("input/foo.j.html")).is_none());
        assert!(in_working.matches(&dirs, Path::new("working/foo.j.html")).is_some());
    }

    #[test]
    fn witness_records_parent_dir() {
        let dirs = dirs();
        let matcher = RegexMatcher::new(r".*").unwrap().under(ContextDir::Working);
        let witness = matcher.matches(&dirs, Path::new("working/a/b.txt")).unwrap();
        let witness = regex_witness(witness);
        assert_eq!(witness.parent_dir(), Some(ContextDir::Working));
        assert_eq!(witness.text(), "a/b.txt");
    }

    #[test]
    fn conjunction_keeps_left_witness() {
        let dirs = dirs();
        let left = Matcher::regex(r"(?P<stem>[^.]*)\.md").unwrap();
        let right = Matcher::func(|_, _| Some(Witness::Unit));
        let both = left & right;

        let witness = both.matches(&dirs, Path::new("input/post.md")).unwrap();
        assert_eq!(regex_witness(witness).group("stem"), Some("post"));

        let neither = Matcher::regex(r".*\.md").unwrap()
            & Matcher::func(|_, _| None);
        assert!(neither.matches(&dirs, Path::new("input/post.md")).is_none());
    }

    #[test]
    fn disjunction_tries_left_first() {
        let dirs = dirs();
        let either = Matcher::func(|_, path| {
            Some(Witness::Path(path.to_path_buf()))
        }) | Matcher::regex(r".*").unwrap();

        match either.matches(&dirs, Path::new("input/a.md")).unwrap() {
            Witness::Path(path) => assert_eq!(path, Path::new("input/a.md")),
            other => panic!("right witness leaked through: {other:?}"),
        }

        let fallback = Matcher::func(|_, _| None) | Matcher::regex(r".*\.md").unwrap();
        assert!(fallback.matches(&dirs, Path::new("input/a.md")).is_some());
        assert!(fallback.matches(&dirs, Path::new("input/a.css")).is_none());
    }

    #[test]
    fn negation_yields_unit() {
        let dirs = dirs();
        let not_md = !Matcher::regex(r".*\.md").unwrap();
        assert!(matches!(
            not_md.matches(&dirs, Path::new("input/a.css")),
            Some(Witness::Unit)
        ));
        assert!(not_md.matches(&dirs, Path::new("input/a.md")).is_none());
    }
}
