//! Source item metadata as seen by the mirror engine.

use chrono::{DateTime, Utc};
use std::fs::Metadata;
use std::path::Path;
use std::time::SystemTime;

/// Kind of a source item after resolving symlinks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    File,
    Directory,
    /// Symlink pointing at a directory; never descended into
    LinkedDirectory,
}

/// Metadata snapshot of a source item
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub kind: ItemKind,

    /// Last modified time (milliseconds since Unix epoch)
    pub modified_ms: i64,
}

impl FileMetadata {
    /// Read metadata for `path`, following symlinks.
    ///
    /// Fails for vanished items and broken symlinks.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let link = tokio::fs::symlink_metadata(path).await?;
        if link.file_type().is_symlink() {
            let target = tokio::fs::metadata(path).await?;
            let mut meta = Self::from_metadata(&target);
            if target.is_dir() {
                meta.kind = ItemKind::LinkedDirectory;
            }
            return Ok(meta);
        }
        Ok(Self::from_metadata(&link))
    }

    fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            kind: if metadata.is_dir() {
                ItemKind::Directory
            } else {
                ItemKind::File
            },
            modified_ms: metadata.modified().map(epoch_millis).unwrap_or_default(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == ItemKind::Directory
    }
}

/// Convert a timestamp to milliseconds since the Unix epoch
pub fn epoch_millis(time: SystemTime) -> i64 {
    DateTime::<Utc>::from(time).timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[tokio::test]
    async fn test_extract_metadata() -> std::io::Result<()> {
        let mut temp_file = NamedTempFile::new()?;
        temp_file.write_all(b"test content")?;
        temp_file.flush()?;

        let metadata = FileMetadata::from_path(temp_file.path()).await?;

        assert_eq!(metadata.kind, ItemKind::File);
        assert!(metadata.modified_ms > 0);

        Ok(())
    }

    #[tokio::test]
    async fn test_directory_metadata() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let metadata = FileMetadata::from_path(temp_dir.path()).await?;
        assert!(metadata.is_dir());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_path_fails() {
        let temp_dir = TempDir::new().unwrap();
        let result = FileMetadata::from_path(&temp_dir.path().join("gone.txt")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_symlinks() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        std::fs::create_dir(temp_dir.path().join("dir"))?;
        std::fs::write(temp_dir.path().join("file.txt"), b"abc")?;
        std::os::unix::fs::symlink(temp_dir.path().join("dir"), temp_dir.path().join("dir-link"))?;
        std::os::unix::fs::symlink(temp_dir.path().join("file.txt"), temp_dir.path().join("file-link"))?;
        std::os::unix::fs::symlink(temp_dir.path().join("nowhere"), temp_dir.path().join("broken"))?;

        let dir_link = FileMetadata::from_path(&temp_dir.path().join("dir-link")).await?;
        assert_eq!(dir_link.kind, ItemKind::LinkedDirectory);

        let file_link = FileMetadata::from_path(&temp_dir.path().join("file-link")).await?;
        assert_eq!(file_link.kind, ItemKind::File);

        assert!(FileMetadata::from_path(&temp_dir.path().join("broken")).await.is_err());
        Ok(())
    }

    #[test]
    fn test_epoch_millis() {
        let time = SystemTime::UNIX_EPOCH + std::time::Duration::from_millis(1_500);
        assert_eq!(epoch_millis(time), 1_500);
    }
}
