//! Configuration management for the mirror agent.
//!
//! Two files are involved:
//! - the agent settings (TOML), read once at startup;
//! - the directory list (JSON), read at startup and rewritten on every change.

use crate::cache::CachePolicy;
use crate::utils::{MirrorError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub backup: BackupSettings,

    #[serde(default)]
    pub files: FileSettings,

    #[serde(default)]
    pub watch: WatchSettings,

    #[serde(default)]
    pub log: LogSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSettings {
    /// Root under which one subdirectory per watched directory is created
    #[serde(default = "default_backup_root")]
    pub root: PathBuf,

    /// Whether cached files are skipped or always overwritten
    #[serde(default)]
    pub policy: CachePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSettings {
    /// Directory list (JSON)
    #[serde(default = "default_directories_file")]
    pub directories: PathBuf,

    /// Record of already-copied files (JSON)
    #[serde(default = "default_cache_file")]
    pub cache: PathBuf,

    /// What to do when the directory list is missing or unreadable.
    /// Unset means the command decides (see [`FileSettings::config_mode_or`])
    #[serde(default)]
    pub config_mode: Option<ConfigMode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchSettings {
    /// Capacity of the per-directory change queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Handling of a missing or unparseable directory list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigMode {
    /// The file must exist before running
    #[default]
    Strict,
    /// The file is created with an empty list
    Bootstrap,
}

// Default values
fn default_backup_root() -> PathBuf {
    PathBuf::from("backup")
}

fn default_directories_file() -> PathBuf {
    PathBuf::from("config.json")
}

fn default_cache_file() -> PathBuf {
    PathBuf::from("backup_cache.json")
}

fn default_queue_capacity() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            root: default_backup_root(),
            policy: CachePolicy::default(),
        }
    }
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            directories: default_directories_file(),
            cache: default_cache_file(),
            config_mode: None,
        }
    }
}

impl FileSettings {
    /// The configured mode, or `fallback` when the settings leave it unset
    pub fn config_mode_or(&self, fallback: ConfigMode) -> ConfigMode {
        self.config_mode.unwrap_or(fallback)
    }
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }
}

/// On-disk shape of the directory list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryList {
    #[serde(default)]
    pub directories: Vec<String>,
}

/// The persisted, append-only list of directories to mirror.
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    path: PathBuf,
    list: DirectoryList,
}

impl DirectoryConfig {
    /// Load the directory list.
    ///
    /// In [`ConfigMode::Strict`] a missing or unparseable file is an error.
    /// In [`ConfigMode::Bootstrap`] an empty list is written in its place.
    pub async fn load(path: &Path, mode: ConfigMode) -> Result<Self> {
        let parsed = match tokio::fs::read_to_string(path).await {
            Ok(content) => serde_json::from_str::<DirectoryList>(&content)
                .map_err(|e| format!("{} is not a valid directory list: {}", path.display(), e)),
            Err(e) => Err(format!("cannot read {}: {}", path.display(), e)),
        };

        match (parsed, mode) {
            (Ok(list), _) => Ok(Self {
                path: path.to_path_buf(),
                list,
            }),
            (Err(reason), ConfigMode::Strict) => Err(MirrorError::Config(format!(
                "{reason}. Please create it with a 'directories' array."
            ))),
            (Err(reason), ConfigMode::Bootstrap) => {
                info!("Directory list unavailable ({}), creating an empty one", reason);
                let config = Self::empty(path);
                config.save().await?;
                Ok(config)
            }
        }
    }

    /// An empty, unsaved list bound to `path`
    pub fn empty(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            list: DirectoryList::default(),
        }
    }

    pub fn directories(&self) -> &[String] {
        &self.list.directories
    }

    pub fn contains(&self, directory: &str) -> bool {
        self.list.directories.iter().any(|d| d == directory)
    }

    /// Append a directory and persist the list.
    ///
    /// Returns `false` without touching the file if it is already present.
    pub async fn push(&mut self, directory: String) -> Result<bool> {
        if self.contains(&directory) {
            return Ok(false);
        }
        self.list.directories.push(directory);
        self.save().await?;
        Ok(true)
    }

    /// Write the list to disk
    pub async fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(&self.list)?;
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }
}
