//! Units of work for the mirror engine.

use crate::fs::path_map::backup_base_for;
use std::fmt;
use std::path::{Path, PathBuf};

/// A source root together with its place in the backup tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedDirectory {
    pub source_root: PathBuf,
    pub backup_base: PathBuf,
}

impl WatchedDirectory {
    pub fn new(source_root: impl Into<PathBuf>, backup_root: &Path) -> Self {
        let source_root = source_root.into();
        let backup_base = backup_base_for(backup_root, &source_root);
        Self {
            source_root,
            backup_base,
        }
    }

    /// Task mirroring the whole source root
    pub fn full_pass(&self) -> MirrorTask {
        MirrorTask::new(self.source_root.clone(), self)
    }

    /// Task mirroring one changed item below the source root
    pub fn change(&self, changed: PathBuf) -> MirrorTask {
        MirrorTask::new(changed, self)
    }
}

/// One mirror invocation: a source item plus the roots it is mapped between.
#[derive(Debug, Clone)]
pub struct MirrorTask {
    pub source_path: PathBuf,
    pub backup_base: PathBuf,
    pub source_root: PathBuf,
}

impl MirrorTask {
    pub fn new(source_path: PathBuf, directory: &WatchedDirectory) -> Self {
        Self {
            source_path,
            backup_base: directory.backup_base.clone(),
            source_root: directory.source_root.clone(),
        }
    }
}

/// Decision taken for a single source item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Copied,
    /// Already in the cache
    Skipped,
    Directory,
    /// Cache file or symlinked directory
    Ignored,
}

/// Per-pass counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MirrorReport {
    pub copied: usize,
    pub skipped: usize,
    pub directories: usize,
    pub ignored: usize,
    pub failed: usize,
}

impl MirrorReport {
    pub fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Copied => self.copied += 1,
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::Directory => self.directories += 1,
            ItemOutcome::Ignored => self.ignored += 1,
        }
    }
}

impl fmt::Display for MirrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} copied, {} skipped, {} directories, {} failed",
            self.copied, self.skipped, self.directories, self.failed
        )
    }
}
