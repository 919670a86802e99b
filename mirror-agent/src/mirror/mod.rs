//! Mirror engine - copies a source subtree into its backup counterpart.
//!
//! Traversal is depth-first over an explicit work stack, so tree depth does
//! not grow the call stack and cancellation is checked between items. Every
//! item is handled in isolation: a failure is logged with the item's relative
//! path and the pass moves on.

pub mod task;

use crate::cache::{CachePolicy, SharedCache};
use crate::fs::{map_path, relative_display, FileMetadata, ItemKind};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use task::{ItemOutcome, MirrorReport, MirrorTask, WatchedDirectory};

pub struct MirrorEngine {
    cache: SharedCache,
    policy: CachePolicy,
    /// Base name of the cache file; never mirrored
    ignore_name: Option<OsString>,
    cancel_token: CancellationToken,
}

impl MirrorEngine {
    /// Create a new engine (no cancellation support)
    pub async fn new(cache: SharedCache, policy: CachePolicy) -> Self {
        Self::with_cancel(cache, policy, CancellationToken::new()).await
    }

    /// Create a new engine that stops between items once `cancel_token` fires
    pub async fn with_cancel(
        cache: SharedCache,
        policy: CachePolicy,
        cancel_token: CancellationToken,
    ) -> Self {
        let ignore_name = cache.lock().await.file_name().map(|n| n.to_os_string());
        Self {
            cache,
            policy,
            ignore_name,
            cancel_token,
        }
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    /// File name excluded from mirroring (the cache file's)
    pub fn ignore_name(&self) -> Option<&OsStr> {
        self.ignore_name.as_deref()
    }

    /// Mirror `task.source_path` (file or whole subtree) into the backup base.
    pub async fn mirror(&self, task: &MirrorTask) -> MirrorReport {
        let mut report = MirrorReport::default();
        let mut pending = vec![task.source_path.clone()];

        while let Some(source) = pending.pop() {
            if self.cancel_token.is_cancelled() {
                info!(
                    "Mirror pass of {} cancelled with {} items left",
                    task.source_root.display(),
                    pending.len() + 1
                );
                break;
            }

            match self.mirror_item(&source, task, &mut pending).await {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    warn!(
                        "Error processing {}: {}",
                        relative_display(&source, &task.source_root),
                        e
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }

    async fn mirror_item(
        &self,
        source: &Path,
        task: &MirrorTask,
        pending: &mut Vec<PathBuf>,
    ) -> std::io::Result<ItemOutcome> {
        let backup_path = map_path(source, &task.source_root, &task.backup_base);

        if self.is_ignored(source) {
            return Ok(ItemOutcome::Ignored);
        }

        let metadata = FileMetadata::from_path(source).await?;

        match metadata.kind {
            ItemKind::Directory => {
                tokio::fs::create_dir_all(&backup_path).await?;

                let mut children = Vec::new();
                let mut entries = tokio::fs::read_dir(source).await?;
                while let Some(entry) = entries.next_entry().await? {
                    children.push(entry.path());
                }
                // Reversed so children pop in the order the filesystem listed them
                pending.extend(children.into_iter().rev());

                Ok(ItemOutcome::Directory)
            }
            ItemKind::LinkedDirectory => {
                debug!(
                    "Not descending into symlinked directory: {}",
                    relative_display(source, &task.source_root)
                );
                Ok(ItemOutcome::Ignored)
            }
            ItemKind::File => self.mirror_file(source, &backup_path, &metadata, task).await,
        }
    }

    async fn mirror_file(
        &self,
        source: &Path,
        backup_path: &Path,
        metadata: &FileMetadata,
        task: &MirrorTask,
    ) -> std::io::Result<ItemOutcome> {
        let relative = relative_display(source, &task.source_root);

        if self.policy == CachePolicy::SkipIfCached && self.cache.lock().await.has(source) {
            info!("File already backed up (skipped): {}", relative);
            return Ok(ItemOutcome::Skipped);
        }

        if let Some(parent) = backup_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(source, backup_path).await?;

        match self.policy {
            CachePolicy::SkipIfCached => {
                self.cache.lock().await.put(source, metadata.modified_ms);
                info!("Backed up new file: {}", relative);
            }
            CachePolicy::OverwriteAlways => {
                info!("Backed up file: {}", relative);
            }
        }

        Ok(ItemOutcome::Copied)
    }

    fn is_ignored(&self, source: &Path) -> bool {
        match (&self.ignore_name, source.file_name()) {
            (Some(ignored), Some(name)) => ignored.as_os_str() == name,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStore;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _temp_dir: TempDir,
        source: PathBuf,
        directory: WatchedDirectory,
        cache: SharedCache,
    }

    /// `<tmp>/src` with `a.txt` = "X" and `sub/b.txt` = "Y", backed up into `<tmp>/backup`
    fn fixture(cache_in_source: bool) -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("src");
        fs::create_dir_all(source.join("sub")).unwrap();
        fs::write(source.join("a.txt"), b"X").unwrap();
        fs::write(source.join("sub/b.txt"), b"Y").unwrap();

        let cache_path = if cache_in_source {
            source.join("backup_cache.json")
        } else {
            temp_dir.path().join("backup_cache.json")
        };
        let directory = WatchedDirectory::new(&source, &temp_dir.path().join("backup"));

        Fixture {
            _temp_dir: temp_dir,
            source,
            directory,
            cache: CacheStore::new(cache_path).shared(),
        }
    }

    #[tokio::test]
    async fn test_full_pass_copies_tree_and_records_cache() {
        let fx = fixture(false);
        let engine = MirrorEngine::new(fx.cache.clone(), CachePolicy::SkipIfCached).await;

        let report = engine.mirror(&fx.directory.full_pass()).await;

        assert_eq!(report.copied, 2);
        assert_eq!(report.directories, 2);
        assert_eq!(report.failed, 0);

        let base = &fx.directory.backup_base;
        assert_eq!(fs::read(base.join("a.txt")).unwrap(), b"X");
        assert_eq!(fs::read(base.join("sub/b.txt")).unwrap(), b"Y");

        let cache = fx.cache.lock().await;
        assert_eq!(cache.len(), 2);
        assert!(cache.has(&fx.source.join("a.txt")));
        assert!(cache.has(&fx.source.join("sub/b.txt")));
        assert!(cache.get(&fx.source.join("a.txt")).unwrap() > 0);
    }

    #[tokio::test]
    async fn test_second_pass_is_idempotent() {
        let fx = fixture(false);
        let engine = MirrorEngine::new(fx.cache.clone(), CachePolicy::SkipIfCached).await;

        engine.mirror(&fx.directory.full_pass()).await;
        fx.cache.lock().await.save_if_dirty().await.unwrap();

        let report = engine.mirror(&fx.directory.full_pass()).await;

        assert_eq!(report.copied, 0);
        assert_eq!(report.skipped, 2);
        let cache = fx.cache.lock().await;
        assert_eq!(cache.len(), 2);
        assert!(!cache.is_dirty());
    }

    #[tokio::test]
    async fn test_cached_file_is_skipped_regardless_of_mtime() {
        let fx = fixture(false);
        let a = fx.source.join("a.txt");
        fx.cache.lock().await.put(&a, 0);

        let engine = MirrorEngine::new(fx.cache.clone(), CachePolicy::SkipIfCached).await;
        let report = engine.mirror(&fx.directory.change(a.clone())).await;

        assert_eq!(report, MirrorReport { skipped: 1, ..Default::default() });
        assert!(!fx.directory.backup_base.join("a.txt").exists());
        assert_eq!(fx.cache.lock().await.get(&a), Some(0));
    }

    #[tokio::test]
    async fn test_modified_file_is_not_recopied_once_cached() {
        let fx = fixture(false);
        let engine = MirrorEngine::new(fx.cache.clone(), CachePolicy::SkipIfCached).await;
        engine.mirror(&fx.directory.full_pass()).await;

        fs::write(fx.source.join("a.txt"), b"changed").unwrap();
        engine.mirror(&fx.directory.change(fx.source.join("a.txt"))).await;

        assert_eq!(fs::read(fx.directory.backup_base.join("a.txt")).unwrap(), b"X");
    }

    #[tokio::test]
    async fn test_overwrite_policy_always_copies_without_cache() {
        let fx = fixture(false);
        let engine = MirrorEngine::new(fx.cache.clone(), CachePolicy::OverwriteAlways).await;

        engine.mirror(&fx.directory.full_pass()).await;
        fs::write(fx.source.join("a.txt"), b"changed").unwrap();
        let report = engine.mirror(&fx.directory.full_pass()).await;

        assert_eq!(report.copied, 2);
        assert_eq!(fs::read(fx.directory.backup_base.join("a.txt")).unwrap(), b"changed");
        let cache = fx.cache.lock().await;
        assert!(cache.is_empty());
        assert!(!cache.is_dirty());
    }

    #[tokio::test]
    async fn test_cache_file_is_never_mirrored() {
        let fx = fixture(true);
        fx.cache.lock().await.put(Path::new("/elsewhere"), 1);
        fx.cache.lock().await.save_if_dirty().await.unwrap();
        assert!(fx.source.join("backup_cache.json").exists());

        let engine = MirrorEngine::new(fx.cache.clone(), CachePolicy::SkipIfCached).await;
        let report = engine.mirror(&fx.directory.full_pass()).await;

        assert_eq!(report.copied, 2);
        assert_eq!(report.ignored, 1);
        assert!(!fx.directory.backup_base.join("backup_cache.json").exists());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_unreadable_item_does_not_stop_siblings() {
        let fx = fixture(false);
        fs::write(fx.source.join("c.txt"), b"Z").unwrap();
        std::os::unix::fs::symlink(fx.source.join("missing"), fx.source.join("broken")).unwrap();

        let engine = MirrorEngine::new(fx.cache.clone(), CachePolicy::SkipIfCached).await;
        let report = engine.mirror(&fx.directory.full_pass()).await;

        assert_eq!(report.copied, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(fs::read(fx.directory.backup_base.join("c.txt")).unwrap(), b"Z");
        assert!(!fx.directory.backup_base.join("broken").exists());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_non_utf8_names_are_all_copied() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let fx = fixture(false);
        let odd = fx.source.join("odd");
        fs::create_dir(&odd).unwrap();
        fs::write(odd.join(OsStr::from_bytes(b"a\xff")), b"1").unwrap();
        fs::write(odd.join(OsStr::from_bytes(b"a\xfe")), b"2").unwrap();

        let engine = MirrorEngine::new(fx.cache.clone(), CachePolicy::SkipIfCached).await;
        let report = engine.mirror(&fx.directory.full_pass()).await;

        assert_eq!(report.copied, 4);
        assert_eq!(report.skipped, 0);
        let backup_odd = fx.directory.backup_base.join("odd");
        assert_eq!(fs::read(backup_odd.join(OsStr::from_bytes(b"a\xff"))).unwrap(), b"1");
        assert_eq!(fs::read(backup_odd.join(OsStr::from_bytes(b"a\xfe"))).unwrap(), b"2");
        assert_eq!(fx.cache.lock().await.len(), 2);
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_symlinked_directory_is_not_followed() {
        let fx = fixture(false);
        std::os::unix::fs::symlink(&fx.source, fx.source.join("loop")).unwrap();

        let engine = MirrorEngine::new(fx.cache.clone(), CachePolicy::SkipIfCached).await;
        let report = engine.mirror(&fx.directory.full_pass()).await;

        assert_eq!(report.copied, 2);
        assert_eq!(report.ignored, 1);
    }

    #[tokio::test]
    async fn test_vanished_item_is_a_logged_no_op() {
        let fx = fixture(false);
        let engine = MirrorEngine::new(fx.cache.clone(), CachePolicy::SkipIfCached).await;

        let report = engine.mirror(&fx.directory.change(fx.source.join("gone.txt"))).await;

        assert_eq!(report, MirrorReport { failed: 1, ..Default::default() });
        assert!(fx.cache.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_incremental_pass_on_new_subdirectory() {
        let fx = fixture(false);
        let engine = MirrorEngine::new(fx.cache.clone(), CachePolicy::SkipIfCached).await;
        engine.mirror(&fx.directory.full_pass()).await;

        fs::create_dir_all(fx.source.join("new/deeper")).unwrap();
        fs::write(fx.source.join("new/deeper/c.txt"), b"Z").unwrap();
        let report = engine.mirror(&fx.directory.change(fx.source.join("new"))).await;

        assert_eq!(report.copied, 1);
        assert_eq!(report.directories, 2);
        assert_eq!(
            fs::read(fx.directory.backup_base.join("new/deeper/c.txt")).unwrap(),
            b"Z"
        );
    }

    #[tokio::test]
    async fn test_cancelled_engine_does_nothing() {
        let fx = fixture(false);
        let token = CancellationToken::new();
        token.cancel();
        let engine =
            MirrorEngine::with_cancel(fx.cache.clone(), CachePolicy::SkipIfCached, token).await;

        let report = engine.mirror(&fx.directory.full_pass()).await;

        assert_eq!(report, MirrorReport::default());
        assert!(!fx.directory.backup_base.exists());
    }
}
