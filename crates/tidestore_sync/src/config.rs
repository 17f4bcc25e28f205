//! Configuration for a data store.

use crate::policy::{ReadPolicy, WritePolicy};
use std::time::Duration;

/// Configuration for data and sync operations on one store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Default strategy for read operations.
    pub read_policy: ReadPolicy,
    /// Default strategy for write operations.
    pub write_policy: WritePolicy,
    /// Fetch only changed ids on collection reads and pulls.
    pub use_delta_set: bool,
    /// Page through network finds that may exceed the server page size.
    pub auto_pagination: bool,
    /// Server-enforced maximum page size.
    pub page_size: u64,
    /// Bounded wait applied when joining dispatched work.
    pub request_timeout: Duration,
    /// Worker threads executing network calls.
    pub worker_threads: usize,
}

impl StoreConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            read_policy: ReadPolicy::default(),
            write_policy: WritePolicy::default(),
            use_delta_set: false,
            auto_pagination: false,
            page_size: 10_000,
            request_timeout: Duration::from_secs(30),
            worker_threads: 4,
        }
    }

    /// Sets the default read policy.
    #[must_use]
    pub fn with_read_policy(mut self, policy: ReadPolicy) -> Self {
        self.read_policy = policy;
        self
    }

    /// Sets the default write policy.
    #[must_use]
    pub fn with_write_policy(mut self, policy: WritePolicy) -> Self {
        self.write_policy = policy;
        self
    }

    /// Enables delta-set fetching for collection reads and pulls.
    #[must_use]
    pub fn with_delta_set(mut self, enabled: bool) -> Self {
        self.use_delta_set = enabled;
        self
    }

    /// Enables auto-pagination for network finds.
    #[must_use]
    pub fn with_auto_pagination(mut self, enabled: bool) -> Self {
        self.auto_pagination = enabled;
        self
    }

    /// Sets the server page size used by auto-pagination.
    #[must_use]
    pub fn with_page_size(mut self, size: u64) -> Self {
        self.page_size = size.max(1);
        self
    }

    /// Sets the bounded wait applied when joining dispatched work.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the number of worker threads.
    #[must_use]
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads.max(1);
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = StoreConfig::new()
            .with_read_policy(ReadPolicy::ForceLocal)
            .with_write_policy(WritePolicy::ForceNetwork)
            .with_delta_set(true)
            .with_auto_pagination(true)
            .with_page_size(100)
            .with_request_timeout(Duration::from_secs(5))
            .with_worker_threads(2);

        assert_eq!(config.read_policy, ReadPolicy::ForceLocal);
        assert_eq!(config.write_policy, WritePolicy::ForceNetwork);
        assert!(config.use_delta_set);
        assert!(config.auto_pagination);
        assert_eq!(config.page_size, 100);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.worker_threads, 2);
    }

    #[test]
    fn zero_sizes_are_clamped() {
        let config = StoreConfig::new().with_page_size(0).with_worker_threads(0);
        assert_eq!(config.page_size, 1);
        assert_eq!(config.worker_threads, 1);
    }

    #[test]
    fn defaults() {
        let config = StoreConfig::default();
        assert!(!config.use_delta_set);
        assert!(!config.auto_pagination);
        assert_eq!(config.page_size, 10_000);
    }
}
