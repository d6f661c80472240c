use std::path::{Path, PathBuf};

pub trait PathExt: AsRef<Path> {
    fn replace_extension(&self, ext: &str) -> PathBuf;
    fn replace_stem(&self, stem: &str) -> PathBuf;
    fn strip_name_suffix(&self, suffix: &str) -> PathBuf;
}

impl PathExt for Path {
    /// Swap the final extension for `ext`, which uses the dotted spelling
    /// (`".html"`). An empty `ext` removes the final extension. Appends when
    /// `self` has no extension at all.
    fn replace_extension(&self, ext: &str) -> PathBuf {
        self.with_extension(ext.strip_prefix('.').unwrap_or(ext))
    }

    /// Swap the file stem for `stem`, keeping the final extension.
    fn replace_stem(&self, stem: &str) -> PathBuf {
        match self.extension() {
            Some(ext) => {
                let mut name = std::ffi::OsString::from(stem);
                name.push(".");
                name.push(ext);
                self.with_file_name(name)
            }
            None => self.with_file_name(stem),
        }
    }

    /// Remove `suffix` from the end of the file name, if present. Unlike
    /// `replace_extension`, this handles compound extensions (`.tar.gz`)
    /// whole.
    fn strip_name_suffix(&self, suffix: &str) -> PathBuf {
        let name = self.file_name().map(|n| n.to_string_lossy());
        match name {
            Some(name) if name.len() > suffix.len() && name.ends_with(suffix) => {
                let trimmed = name[..name.len() - suffix.len()].to_string();
                self.with_file_name(trimmed)
            }
            _ => self.to_path_buf(),
        }
    }
}

impl PathExt for PathBuf {
    fn replace_extension(&self, ext: &str) -> PathBuf {
        self.as_path().replace_extension(ext)
    }

    fn replace_stem(&self, stem: &str) -> PathBuf {
        self.as_path().replace_stem(stem)
    }

    fn strip_name_suffix(&self, suffix: &str) -> PathBuf {
        self.as_path().strip_name_suffix(suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_extension() {
        assert_eq!(Path::new("a/foo.txt").replace_extension(".html"), PathBuf::from("a/foo.html"));
        assert_eq!(Path::new("a/foo.j.txt").replace_extension(".html"), PathBuf::from("a/foo.j.html"));
        assert_eq!(Path::new("a/foo").replace_extension(".html"), PathBuf::from("a/foo.html"));
        assert_eq!(Path::new("a/foo.txt").replace_extension(""), PathBuf::from("a/foo"));
    }

    #[test]
    fn test_replace_stem() {
        assert_eq!(Path::new("a/foo.txt").replace_stem("bar"), PathBuf::from("a/bar.txt"));
        assert_eq!(Path::new("a/foo").replace_stem("bar"), PathBuf::from("a/bar"));
        assert_eq!(Path::new("a/foo.j.txt").replace_stem("bar"), PathBuf::from("a/bar.txt"));
    }

    #[test]
    fn test_strip_name_suffix() {
        assert_eq!(Path::new("a/foo.tar.gz").strip_name_suffix(".tar.gz"), PathBuf::from("a/foo"));
        assert_eq!(Path::new("a/foo.txt").strip_name_suffix(".zip"), PathBuf::from("a/foo.txt"));
        assert_eq!(Path::new("a/.gz").strip_name_suffix(".gz"), PathBuf::from("a/.gz"));
    }
}
