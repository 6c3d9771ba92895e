//! Cache configuration.
//!
//! Carries the key namespace and scan paging into the recommendation engine
//! and the in-process backend's capacity.

use std::num::{NonZeroU32, NonZeroUsize};

use super::keys::CacheNamespace;

const DEFAULT_SCAN_PAGE_SIZE: u32 = 100;
const DEFAULT_MEMORY_CAPACITY: usize = 10_000;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Prefix shared by every key this service writes.
    pub namespace: CacheNamespace,
    /// Keys requested per scan round trip during invalidation.
    pub scan_page_size: NonZeroU32,
    /// Maximum entries held by the in-process backend.
    pub memory_capacity: NonZeroUsize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: CacheNamespace::default(),
            scan_page_size: NonZeroU32::new(DEFAULT_SCAN_PAGE_SIZE).unwrap_or(NonZeroU32::MIN),
            memory_capacity: NonZeroUsize::new(DEFAULT_MEMORY_CAPACITY)
                .unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            namespace: CacheNamespace::new(settings.namespace.clone()),
            scan_page_size: settings.scan_page_size,
            memory_capacity: settings.memory_capacity,
        }
    }
}

impl CacheConfig {
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = CacheNamespace::new(namespace);
        self
    }

    pub fn with_scan_page_size(mut self, size: u32) -> Self {
        self.scan_page_size = NonZeroU32::new(size).unwrap_or(NonZeroU32::MIN);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.namespace.as_str(), "trendline:recommendation");
        assert_eq!(config.scan_page_size.get(), 100);
        assert_eq!(config.memory_capacity.get(), 10_000);
    }

    #[test]
    fn zero_page_size_clamps_to_min() {
        let config = CacheConfig::default().with_scan_page_size(0);
        assert_eq!(config.scan_page_size.get(), 1);
    }
}
