//! Filesystem helpers: path mapping, metadata and read-only traversal.

pub mod metadata;
pub mod path_map;
pub mod walker;

pub use metadata::{FileMetadata, ItemKind};
pub use path_map::{backup_base_for, map_path, relative_display};
