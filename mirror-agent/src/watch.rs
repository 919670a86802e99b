//! Filesystem change notifications for a watched directory.
//!
//! Each watcher feeds the paths of changed items into a bounded queue. The
//! notify callback blocks while the queue is full, so a burst of events is
//! absorbed by the queue instead of piling up concurrent copies.

use crate::utils::Result;
use notify::event::{AccessKind, AccessMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Live recursive subscription; dropping it stops the notifications.
pub struct ChangeWatcher {
    root: PathBuf,
    _watcher: RecommendedWatcher,
}

impl ChangeWatcher {
    /// Subscribe to changes below `root`.
    ///
    /// Returns the watcher together with the receiving end of its queue.
    /// Items named `ignore_name` (the cache file) are never queued.
    pub fn watch(
        root: &Path,
        ignore_name: Option<OsString>,
        queue_capacity: usize,
    ) -> Result<(Self, mpsc::Receiver<PathBuf>)> {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let event_root = root.to_path_buf();

        let mut watcher = notify::recommended_watcher(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => {
                    for path in changed_paths(&event, &event_root, ignore_name.as_deref()) {
                        debug!("Change detected: {:?} {}", event.kind, path.display());
                        if tx.blocking_send(path).is_err() {
                            debug!("Change queue for {} closed", event_root.display());
                            return;
                        }
                    }
                }
                Err(e) => warn!("Watch error in {}: {}", event_root.display(), e),
            },
        )?;
        watcher.watch(root, RecursiveMode::Recursive)?;

        info!("Monitoring directory: {}", root.display());

        Ok((
            Self {
                root: root.to_path_buf(),
                _watcher: watcher,
            },
            rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Paths from `event` that should trigger an incremental pass
fn changed_paths(event: &Event, root: &Path, ignore_name: Option<&OsStr>) -> Vec<PathBuf> {
    if !is_relevant(&event.kind) {
        return Vec::new();
    }

    event
        .paths
        .iter()
        .filter(|path| !path.as_os_str().is_empty())
        .filter(|path| match (ignore_name, path.file_name()) {
            (Some(ignored), Some(name)) => ignored != name,
            _ => true,
        })
        .map(|path| {
            if path.is_relative() {
                root.join(path)
            } else {
                path.clone()
            }
        })
        .collect()
}

/// Reads and opens do not change content; a close after writing does.
fn is_relevant(kind: &EventKind) -> bool {
    match kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => true,
        EventKind::Access(_) => false,
        _ => true,
    }
}
