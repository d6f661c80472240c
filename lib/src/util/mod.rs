mod path_ext;
mod fs;

pub use path_ext::*;
pub use fs::*;

use std::borrow::Cow;
use std::path::{Component, Path};

/// Render a relative path with `/` separators regardless of platform. Used
/// for regex matching and for custody keys, where byte-stable strings matter.
pub fn posix_str(path: &Path) -> Cow<'_, str> {
    match path.to_str() {
        Some(s) if !s.contains('\\') => Cow::Borrowed(s),
        _ => {
            let mut out = String::new();
            for component in path.components() {
                if let Component::Normal(part) = component {
                    if !out.is_empty() {
                        out.push('/');
                    }

                    out.push_str(&part.to_string_lossy());
                }
            }

            Cow::Owned(out)
        }
    }
}

#[cfg(test)]
mod posix_tests {
    use super::*;

    #[test]
    fn test_posix_str() {
        assert_eq!(posix_str(Path::new("a/b/c.txt")), "a/b/c.txt");
        assert_eq!(posix_str(Path::new("c.txt")), "c.txt");
    }
}
