use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Enumerate every regular file beneath `root` in a deterministic order,
/// sorted lexicographically by full path.
///
/// Symlinks are kept only when they resolve to a regular file inside `root`;
/// links escaping the tree are skipped so a build can never read outside its
/// input. `skip` holds directories to leave unvisited, which matters when the
/// output or working directory nests inside the input tree.
pub fn discover(root: &Path, skip: &[&Path]) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Ok(vec![]);
    }

    let walker = jwalk::WalkDir::new(root)
        .follow_links(false)
        .skip_hidden(false)
        .sort(true);

    let mut files = vec![];
    'entries: for entry in walker.into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        for skipped in skip {
            if path.starts_with(skipped) {
                continue 'entries;
            }
        }

        let file_type = entry.file_type;
        if file_type.is_file() {
            files.push(path);
        } else if file_type.is_symlink() && resolves_inside(&path, root) {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

fn resolves_inside(link: &Path, root: &Path) -> bool {
    match fs::canonicalize(link) {
        Ok(target) => target.is_file() && target.starts_with(root),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorted_and_recursive() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("z.txt"), "z").unwrap();
        fs::write(tmp.path().join("a.txt"), "a").unwrap();
        fs::write(tmp.path().join("sub/m.txt"), "m").unwrap();

        let files = discover(tmp.path(), &[]).unwrap();
        let names: Vec<_> = files.iter()
            .map(|p| p.strip_prefix(tmp.path()).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.txt", "sub/m.txt", "z.txt"]);
    }

    #[test]
    fn includes_dotfiles() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join(".hidden"), "").unwrap();

        let files = discover(tmp.path(), &[]).unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn missing_root_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(discover(&tmp.path().join("nope"), &[]).unwrap().is_empty());
    }

    #[test]
    fn skips_nested_build_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let build = tmp.path().join("build");
        fs::create_dir_all(&build).unwrap();
        fs::write(tmp.path().join("a.txt"), "a").unwrap();
        fs::write(build.join("stale.html"), "x").unwrap();

        let files = discover(tmp.path(), &[build.as_path()]).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("a.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn skips_symlinks_escaping_the_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("secret.txt"), "s").unwrap();
        fs::write(tmp.path().join("in.txt"), "i").unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret.txt"),
            tmp.path().join("leak.txt"),
        ).unwrap();

        let files = discover(tmp.path(), &[]).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("in.txt"));
    }
}
