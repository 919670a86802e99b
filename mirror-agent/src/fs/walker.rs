//! Read-only directory traversal for reporting.
//!
//! The mirror pass does its own traversal; this walker only enumerates the
//! files a pass would consider, e.g. to count what is still pending.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Options for directory walking
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Exact file names to leave out (e.g. the cache file)
    pub exclude_names: Vec<OsString>,
}

impl WalkOptions {
    /// Options that leave out a single file name
    pub fn excluding(name: impl Into<OsString>) -> Self {
        Self {
            exclude_names: vec![name.into()],
        }
    }
}

/// Walk a directory tree and collect the paths of all files.
///
/// Symlinks are not followed into directories; a symlink to a file counts
/// as a file. Unreadable entries below the root are skipped; only a failure
/// to read the root itself is reported.
///
/// # Example
/// ```no_run
/// use mirror_agent::fs::walker::{walk_files, WalkOptions};
/// use std::path::Path;
///
/// let files = walk_files(Path::new("/data"), &WalkOptions::excluding("backup_cache.json")).unwrap();
/// println!("Found {} files", files.len());
/// ```
pub fn walk_files(root: &Path, options: &WalkOptions) -> std::io::Result<Vec<PathBuf>> {
    std::fs::metadata(root)?;

    let files = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| !is_excluded(entry, &options.exclude_names))
        .filter_map(|entry| entry.ok())
        .filter(|entry| !entry.file_type().is_dir())
        .filter(is_file)
        .map(|entry| entry.into_path())
        .collect();

    Ok(files)
}

/// Broken symlinks, vanished entries and links to directories are not files
fn is_file(entry: &DirEntry) -> bool {
    std::fs::metadata(entry.path()).is_ok_and(|m| !m.is_dir())
}

fn is_excluded(entry: &DirEntry, names: &[OsString]) -> bool {
    names.iter().any(|name| entry.file_name() == name.as_os_str())
}
