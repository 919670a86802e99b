//! Mirror Agent Library
//!
//! Incremental directory mirroring: watched source directories are copied
//! into a backup root, with a persisted cache preventing repeated copies.

pub mod cache;
pub mod config;
pub mod console;
pub mod daemon;
pub mod fs;
pub mod mirror;
pub mod supervisor;
pub mod utils;
pub mod watch;

// Re-export commonly used types
pub use cache::{CachePolicy, CacheStore, SharedCache};
pub use config::Settings;
pub use mirror::MirrorEngine;
pub use supervisor::DirectorySupervisor;
pub use utils::errors::MirrorError;
pub type Result<T> = std::result::Result<T, MirrorError>;
