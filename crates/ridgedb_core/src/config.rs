//! Index and lock configuration.

use ridgedb_storage::DEFAULT_PAGE_SIZE;
use std::path::PathBuf;
use std::time::Duration;

/// Where index page stores live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    /// Every index keeps its pages in memory.
    InMemory,
    /// Every index keeps its pages in `<dir>/<database>/<table>/<index>.idx`.
    Directory(PathBuf),
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::InMemory
    }
}

/// Sizing of index pages.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Size of every page in bytes.
    pub page_size: usize,

    /// Maximum entries in a B-Tree leaf page.
    pub leaf_capacity: usize,

    /// Maximum keys in a B-Tree internal page.
    pub internal_capacity: usize,

    /// Maximum entries in a hash bucket before it splits.
    pub bucket_capacity: usize,

    /// Upper bound on the hash directory's global depth.
    pub max_global_depth: u8,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            leaf_capacity: 64,
            internal_capacity: 128,
            bucket_capacity: 32,
            max_global_depth: 16,
        }
    }
}

impl IndexConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the page size.
    #[must_use]
    pub const fn page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    /// Sets both leaf and internal capacity.
    #[must_use]
    pub const fn capacity(mut self, entries: usize) -> Self {
        self.leaf_capacity = entries;
        self.internal_capacity = entries;
        self
    }

    /// Sets the leaf capacity.
    #[must_use]
    pub const fn leaf_capacity(mut self, entries: usize) -> Self {
        self.leaf_capacity = entries;
        self
    }

    /// Sets the internal page capacity.
    #[must_use]
    pub const fn internal_capacity(mut self, keys: usize) -> Self {
        self.internal_capacity = keys;
        self
    }

    /// Sets the hash bucket capacity.
    #[must_use]
    pub const fn bucket_capacity(mut self, entries: usize) -> Self {
        self.bucket_capacity = entries;
        self
    }

    /// Sets the maximum hash directory depth.
    #[must_use]
    pub const fn max_global_depth(mut self, depth: u8) -> Self {
        self.max_global_depth = depth;
        self
    }
}

/// Lock manager settings.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// How long [`crate::lock::RecordLockManager::lock_wait`] and friends
    /// block before giving up. Plain `lock` calls never wait.
    pub wait_timeout: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_secs(50),
        }
    }
}

impl LockConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the wait timeout.
    #[must_use]
    pub const fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }
}

/// Configuration for an [`crate::index::IndexManager`].
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Page store placement.
    pub storage: StorageConfig,

    /// Page sizing.
    pub index: IndexConfig,

    /// Lock manager settings.
    pub lock: LockConfig,
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the storage placement.
    #[must_use]
    pub fn storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }

    /// Sets the index sizing.
    #[must_use]
    pub fn index(mut self, index: IndexConfig) -> Self {
        self.index = index;
        self
    }

    /// Sets the lock settings.
    #[must_use]
    pub fn lock(mut self, lock: LockConfig) -> Self {
        self.lock = lock;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.storage, StorageConfig::InMemory);
        assert_eq!(config.index.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.lock.wait_timeout, Duration::from_secs(50));
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .index(IndexConfig::new().capacity(4).bucket_capacity(2))
            .lock(LockConfig::new().wait_timeout(Duration::from_millis(10)));

        assert_eq!(config.index.leaf_capacity, 4);
        assert_eq!(config.index.internal_capacity, 4);
        assert_eq!(config.index.bucket_capacity, 2);
        assert_eq!(config.lock.wait_timeout, Duration::from_millis(10));
    }
}
