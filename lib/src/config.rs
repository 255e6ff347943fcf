use std::path::{Path, PathBuf};
use std::time::Duration;

use super::storage_layer::header::SALT_SIZE;

/// Highest skip-list level an index may use.
pub const MAX_LEVEL_LIMIT: u8 = 32;

/// Configuration for opening an [`Engine`](crate::Engine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory handed to the page store.
    pub path: PathBuf,
    /// How long `write_lock` waits for a collection lock. `None` waits forever.
    pub lock_timeout: Option<Duration>,
    /// Caller-defined schema version written into a freshly created file.
    pub user_version: u16,
    /// Salt written into a freshly created file.
    pub salt: [u8; SALT_SIZE],
    /// Skip-list height cap for indexes created by this engine.
    pub max_index_levels: u8,
}

impl EngineConfig {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock_timeout: None,
            user_version: 0,
            salt: [0u8; SALT_SIZE],
            max_index_levels: MAX_LEVEL_LIMIT,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    pub fn with_user_version(mut self, user_version: u16) -> Self {
        self.user_version = user_version;
        self
    }

    pub fn with_salt(mut self, salt: [u8; SALT_SIZE]) -> Self {
        self.salt = salt;
        self
    }

    /// Sets the skip-list height cap, clamped to `1..=32`.
    pub fn with_max_index_levels(mut self, levels: u8) -> Self {
        self.max_index_levels = levels.clamp(1, MAX_LEVEL_LIMIT);
        self
    }
}
