//! Directory supervisor - owns the set of watched directories.
//!
//! Every watched directory gets one task: an initial full pass, followed by
//! an incremental pass per queued change. Each pass ends with a cache save.
//! Once active the supervisor stays active; activating again only starts
//! directories that are not running yet.

use crate::cache::{CachePolicy, SharedCache};
use crate::config::{DirectoryConfig, Settings};
use crate::fs::walker::{walk_files, WalkOptions};
use crate::mirror::{MirrorEngine, WatchedDirectory};
use crate::utils::{MirrorError, Result};
use crate::watch::ChangeWatcher;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long shutdown waits for a directory task to stop
const TASK_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Inactive,
    Active,
}

/// Result of adding a directory through the control surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadyExists,
    DoesNotExist,
}

/// Backup progress of one configured directory
#[derive(Debug, Clone)]
pub struct DirectoryStatus {
    pub source_root: PathBuf,
    pub backup_base: PathBuf,
    pub watching: bool,
    /// None when the source cannot be read
    pub total_files: Option<usize>,
    /// Files without a cache entry. None when the source cannot be read,
    /// or under [`CachePolicy::OverwriteAlways`], which never records copies
    pub pending_files: Option<usize>,
}

struct RunningDirectory {
    watcher: Option<ChangeWatcher>,
    task: JoinHandle<()>,
}

pub struct DirectorySupervisor {
    settings: Settings,
    config: DirectoryConfig,
    cache: SharedCache,
    engine: Arc<MirrorEngine>,
    state: SupervisorState,
    running: HashMap<PathBuf, RunningDirectory>,
    cancel_token: CancellationToken,
}

impl DirectorySupervisor {
    /// Create an inactive supervisor. Cancelling `cancel_token` stops every
    /// directory task and any pass in progress.
    pub async fn new(
        settings: Settings,
        config: DirectoryConfig,
        cache: SharedCache,
        cancel_token: CancellationToken,
    ) -> Self {
        let engine = MirrorEngine::with_cancel(
            cache.clone(),
            settings.backup.policy,
            cancel_token.child_token(),
        )
        .await;

        Self {
            settings,
            config,
            cache,
            engine: Arc::new(engine),
            state: SupervisorState::Inactive,
            running: HashMap::new(),
            cancel_token,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn directories(&self) -> &[String] {
        self.config.directories()
    }

    /// Whether `source_root` has a running directory task
    pub fn is_running(&self, source_root: &Path) -> bool {
        self.running.contains_key(source_root)
    }

    /// Whether `source_root` has a live change subscription
    pub fn is_watching(&self, source_root: &Path) -> bool {
        self.running
            .get(source_root)
            .is_some_and(|running| running.watcher.is_some())
    }

    /// Start every configured directory that is not running yet.
    ///
    /// Returns the number of directories started by this call.
    pub async fn activate(&mut self) -> Result<usize> {
        match self.state {
            SupervisorState::Inactive => info!("Backup manager is now active"),
            SupervisorState::Active => {
                info!("Backup manager is already active, refreshing monitored directories")
            }
        }
        self.state = SupervisorState::Active;

        tokio::fs::create_dir_all(&self.settings.backup.root).await?;

        let mut started = 0;
        for source_root in self.source_roots().await {
            if self.start_directory(source_root) {
                started += 1;
            }
        }

        Ok(started)
    }

    /// Add a directory to the configuration and, if active, start it at once.
    pub async fn add_directory(&mut self, path: &Path) -> Result<AddOutcome> {
        let source_root = match tokio::fs::canonicalize(path).await {
            Ok(p) => p,
            Err(_) => return Ok(AddOutcome::DoesNotExist),
        };
        let is_dir = tokio::fs::metadata(&source_root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Ok(AddOutcome::DoesNotExist);
        }

        let entry = source_root.to_string_lossy().into_owned();
        if self.config.contains(&entry) || self.source_roots().await.contains(&source_root) {
            return Ok(AddOutcome::AlreadyExists);
        }

        self.warn_on_shared_backup_base(&source_root);
        self.config.push(entry).await?;
        info!("Added directory: {}", source_root.display());

        if self.state == SupervisorState::Active {
            self.start_directory(source_root);
        }

        Ok(AddOutcome::Added)
    }

    /// File counts per configured directory
    pub async fn status(&self) -> Result<Vec<DirectoryStatus>> {
        let options = WalkOptions {
            exclude_names: self.engine.ignore_name().map(|n| n.to_os_string()).into_iter().collect(),
        };
        let tracks_cache = self.settings.backup.policy == CachePolicy::SkipIfCached;

        let mut statuses = Vec::with_capacity(self.config.directories().len());
        for source in self.source_roots().await {
            let directory = WatchedDirectory::new(source, &self.settings.backup.root);

            let root = directory.source_root.clone();
            let walk_options = options.clone();
            let walked = tokio::task::spawn_blocking(move || walk_files(&root, &walk_options))
                .await
                .map_err(|e| MirrorError::Io(std::io::Error::other(e)))?;

            let (total_files, pending_files) = match walked {
                Ok(files) if tracks_cache => {
                    let cache = self.cache.lock().await;
                    let pending = files.iter().filter(|f| !cache.has(f)).count();
                    (Some(files.len()), Some(pending))
                }
                Ok(files) => (Some(files.len()), None),
                Err(e) => {
                    warn!("Cannot read {}: {}", directory.source_root.display(), e);
                    (None, None)
                }
            };

            statuses.push(DirectoryStatus {
                watching: self.is_watching(&directory.source_root),
                source_root: directory.source_root,
                backup_base: directory.backup_base,
                total_files,
                pending_files,
            });
        }

        Ok(statuses)
    }

    /// Stop all directory tasks and watchers, then flush the cache.
    ///
    /// Returns whether the cache had to be written.
    pub async fn shutdown(&mut self) -> Result<bool> {
        self.cancel_token.cancel();

        for (source_root, running) in self.running.drain() {
            match tokio::time::timeout(TASK_STOP_TIMEOUT, running.task).await {
                Ok(Ok(())) => debug!("Stopped {}", source_root.display()),
                Ok(Err(e)) => warn!("Directory task for {} failed: {}", source_root.display(), e),
                Err(_) => warn!("Directory task for {} did not stop in time", source_root.display()),
            }
            drop(running.watcher);
        }

        self.cache.lock().await.save_if_dirty().await
    }

    /// Configured directories, each resolved to its canonical path.
    ///
    /// An entry that cannot be resolved (e.g. it no longer exists) is kept
    /// as written.
    async fn source_roots(&self) -> Vec<PathBuf> {
        let mut roots = Vec::with_capacity(self.config.directories().len());
        for entry in self.config.directories() {
            let root = tokio::fs::canonicalize(entry)
                .await
                .unwrap_or_else(|_| PathBuf::from(entry));
            roots.push(root);
        }
        roots
    }

    fn start_directory(&mut self, source_root: PathBuf) -> bool {
        if self.running.contains_key(&source_root) {
            return false;
        }

        let directory = WatchedDirectory::new(source_root.clone(), &self.settings.backup.root);

        let (watcher, changes) = match ChangeWatcher::watch(
            &source_root,
            self.engine.ignore_name().map(|n| n.to_os_string()),
            self.settings.watch.queue_capacity,
        ) {
            Ok((watcher, changes)) => (Some(watcher), Some(changes)),
            Err(e) => {
                warn!(
                    "Live monitoring of {} unavailable, running initial backup only: {}",
                    source_root.display(),
                    e
                );
                (None, None)
            }
        };

        let task = tokio::spawn(run_directory(
            Arc::clone(&self.engine),
            directory,
            changes,
            self.cancel_token.child_token(),
        ));

        self.running.insert(source_root, RunningDirectory { watcher, task });
        true
    }

    fn warn_on_shared_backup_base(&self, source_root: &Path) {
        let root = &self.settings.backup.root;
        let backup_base = WatchedDirectory::new(source_root, root).backup_base;
        for existing in self.config.directories() {
            if WatchedDirectory::new(existing, root).backup_base == backup_base {
                warn!(
                    "{} and {} share the backup directory {}",
                    existing,
                    source_root.display(),
                    backup_base.display()
                );
            }
        }
    }
}

/// Full pass, then one incremental pass per queued change until cancelled.
async fn run_directory(
    engine: Arc<MirrorEngine>,
    directory: WatchedDirectory,
    changes: Option<mpsc::Receiver<PathBuf>>,
    cancel_token: CancellationToken,
) {
    if let Err(e) = tokio::fs::create_dir_all(&directory.backup_base).await {
        warn!("Cannot create {}: {}", directory.backup_base.display(), e);
    }

    let report = engine.mirror(&directory.full_pass()).await;
    info!("Initial backup of {} finished: {}", directory.source_root.display(), report);
    save_cache(engine.cache()).await;

    let Some(mut changes) = changes else {
        return;
    };

    loop {
        let changed = tokio::select! {
            _ = cancel_token.cancelled() => break,
            changed = changes.recv() => match changed {
                Some(path) => path,
                None => break,
            },
        };

        let report = engine.mirror(&directory.change(changed)).await;
        debug!("Incremental pass in {}: {}", directory.source_root.display(), report);
        save_cache(engine.cache()).await;
    }
}

async fn save_cache(cache: &SharedCache) {
    if let Err(e) = cache.lock().await.save_if_dirty().await {
        error!("Failed to save cache: {}", e);
    }
}
