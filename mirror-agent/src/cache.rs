//! Persisted record of files that have already been copied.
//!
//! Keys are absolute source paths, values the source modification time (ms
//! since the Unix epoch) at the moment of the copy. Presence of a key is all
//! that matters for skipping; entries are never evicted.

use crate::utils::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Cache handle shared by the engine, the supervisor and shutdown
pub type SharedCache = Arc<Mutex<CacheStore>>;

/// How the engine treats files it has copied before.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Copy a file once; later encounters are skipped while it is cached
    #[default]
    SkipIfCached,
    /// Copy on every encounter without consulting or updating the cache
    OverwriteAlways,
}

impl FromStr for CachePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "skip_if_cached" => Ok(Self::SkipIfCached),
            "overwrite_always" => Ok(Self::OverwriteAlways),
            other => Err(format!(
                "unknown cache policy '{other}' (expected skip_if_cached or overwrite_always)"
            )),
        }
    }
}

#[derive(Debug)]
pub struct CacheStore {
    path: PathBuf,
    entries: HashMap<String, i64>,
    dirty: bool,
}

impl CacheStore {
    /// An empty store persisted at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: HashMap::new(),
            dirty: false,
        }
    }

    /// Load the store from `path`.
    ///
    /// A missing or corrupt file yields an empty store; this is the normal
    /// first-run condition, not an error.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let mut store = Self::new(path);

        match tokio::fs::read_to_string(&store.path).await {
            Ok(content) => match serde_json::from_str::<HashMap<String, i64>>(&content) {
                Ok(entries) => {
                    store.entries = entries;
                    info!("Cache loaded: {} entries", store.entries.len());
                }
                Err(e) => {
                    warn!("Cache file {} is corrupt ({}), starting empty", store.path.display(), e);
                }
            },
            Err(e) => {
                info!("No cache file at {} ({}), starting empty", store.path.display(), e);
            }
        }

        store
    }

    /// Wrap the store for sharing
    pub fn shared(self) -> SharedCache {
        Arc::new(Mutex::new(self))
    }

    /// Base name of the cache file; items with this name are never mirrored
    pub fn file_name(&self) -> Option<&OsStr> {
        self.path.file_name()
    }

    /// Paths that are not valid UTF-8 are never cached
    pub fn has(&self, source: &Path) -> bool {
        key(source).is_some_and(|k| self.entries.contains_key(k))
    }

    pub fn get(&self, source: &Path) -> Option<i64> {
        key(source).and_then(|k| self.entries.get(k).copied())
    }

    /// Record a copied file and mark the store dirty.
    ///
    /// A path that is not valid UTF-8 has no lossless key and is not
    /// recorded, so it is copied again on every encounter.
    pub fn put(&mut self, source: &Path, modified_ms: i64) {
        match key(source) {
            Some(k) => {
                self.entries.insert(k.to_string(), modified_ms);
                self.dirty = true;
            }
            None => debug!("Not caching non UTF-8 path {}", source.display()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Persist the store if anything changed since the last save.
    ///
    /// Returns whether a write happened.
    pub async fn save_if_dirty(&mut self) -> Result<bool> {
        if !self.dirty {
            debug!("Cache unchanged, nothing to save");
            return Ok(false);
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let sorted: BTreeMap<&String, &i64> = self.entries.iter().collect();
        let content = serde_json::to_string_pretty(&sorted)?;
        tokio::fs::write(&self.path, content).await?;
        self.dirty = false;

        info!("Cache saved: {} entries", self.entries.len());
        Ok(true)
    }
}

fn key(source: &Path) -> Option<&str> {
    source.to_str()
}
