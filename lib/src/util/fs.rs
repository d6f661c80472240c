use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Create the parent directory of `path`, and every ancestor it needs.
pub fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|source| Error::io("create directory", parent, source))?;
    }

    Ok(())
}

/// Delete everything inside `path` while keeping `path` itself. Missing
/// directories are fine.
pub fn remove_children(path: &Path) -> Result<()> {
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(source) => return Err(Error::io("list", path, source)),
    };

    for entry in entries {
        let entry = entry.map_err(|source| Error::io("list", path, source))?;
        let child = entry.path();
        let result = match entry.file_type() {
            Ok(t) if t.is_dir() => fs::remove_dir_all(&child),
            _ => fs::remove_file(&child),
        };

        result.map_err(|source| Error::io("purge", &child, source))?;
    }

    Ok(())
}

/// Remove empty directories from `start` upward, stopping at `root` (which is
/// never removed). Quietly stops at the first non-empty ancestor.
pub fn prune_empty_dirs(start: &Path, root: &Path) {
    let mut current = start;
    while current != root && current.starts_with(root) {
        if fs::remove_dir(current).is_err() {
            break;
        }

        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }
}
