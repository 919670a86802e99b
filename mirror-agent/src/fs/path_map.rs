//! Mapping between source paths and their backup counterparts.
//!
//! A watched directory `/data/photos` mirrored into `/backup` gets the backup
//! base `/backup/photos`; every item below the source root keeps its relative
//! position below that base.

use std::path::{Path, PathBuf};

/// Base name used when a source root has none (e.g. `/`)
const UNNAMED_ROOT: &str = "root";

/// Backup base directory for a watched source root
pub fn backup_base_for(backup_root: &Path, source_root: &Path) -> PathBuf {
    match source_root.file_name() {
        Some(name) => backup_root.join(name),
        None => backup_root.join(UNNAMED_ROOT),
    }
}

/// Map a source path to its location under `backup_base`.
///
/// `source_path == source_root` maps to `backup_base` itself. A path that is
/// not below `source_root` is placed directly under `backup_base` by file
/// name, so the result never escapes the backup base.
pub fn map_path(source_path: &Path, source_root: &Path, backup_base: &Path) -> PathBuf {
    match source_path.strip_prefix(source_root) {
        Ok(relative) if relative.as_os_str().is_empty() => backup_base.to_path_buf(),
        Ok(relative) => backup_base.join(relative),
        Err(_) => match source_path.file_name() {
            Some(name) => backup_base.join(name),
            None => backup_base.to_path_buf(),
        },
    }
}

/// Relative path used in log lines
pub fn relative_display(source_path: &Path, source_root: &Path) -> String {
    match source_path.strip_prefix(source_root) {
        Ok(relative) if relative.as_os_str().is_empty() => source_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source_root.display().to_string()),
        Ok(relative) => relative.display().to_string(),
        Err(_) => source_path.display().to_string(),
    }
}
