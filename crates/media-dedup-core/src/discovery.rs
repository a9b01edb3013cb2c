use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// A regular file found under an index root
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovered {
    /// Path as it will be written to the store
    File { path: PathBuf, recorded: String },

    /// File whose path cannot be written to a TSV row
    Unrepresentable(PathBuf),

    /// Directory entry the walk could not read
    WalkError(String),
}

/// Check that `root` is an existing directory and return its canonical
/// form. Every spelling of the same directory (`..`, `.`, symlinks) records
/// its files under one path.
pub fn resolve_root(root: &Path) -> Result<PathBuf> {
    if !root.is_dir() {
        return Err(Error::InvalidRoot(root.to_path_buf()));
    }
    Ok(root.canonicalize()?)
}

/// Walk `root` in a stable order, yielding every regular file.
/// Symlinks are not followed; unreadable directories are reported, not fatal.
pub fn walk_files(root: &Path) -> impl Iterator<Item = Discovered> {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) if entry.file_type().is_file() => Some(classify(entry.into_path())),
            Ok(_) => None,
            Err(e) => Some(Discovered::WalkError(e.to_string())),
        })
}

fn classify(path: PathBuf) -> Discovered {
    match path.to_str() {
        Some(recorded) if is_representable(recorded) => Discovered::File {
            recorded: recorded.to_string(),
            path,
        },
        _ => Discovered::Unrepresentable(path),
    }
}

/// Paths containing row or column separators would corrupt the store
pub fn is_representable(path: &str) -> bool {
    !path.contains(|c: char| matches!(c, '\t' | '\n' | '\r'))
}
