//! Key-value cache abstraction shared by the in-process and Redis backends.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("malformed cache payload for `{key}`: {reason}")]
    Payload { key: String, reason: String },
}

impl CacheError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    pub fn payload(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Payload {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Opaque scan position. Zero starts a scan and, when returned, ends it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanCursor(pub u64);

impl ScanCursor {
    pub const START: ScanCursor = ScanCursor(0);

    pub fn is_complete(self) -> bool {
        self.0 == 0
    }
}

/// One page of a prefix scan.
#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    pub keys: Vec<String>,
    pub next: ScanCursor,
}

#[async_trait]
pub trait KvCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;

    async fn set_with_ttl(&self, key: &str, value: Bytes, ttl: Duration)
    -> Result<(), CacheError>;

    /// Visit keys starting with the literal `prefix`, roughly `page_size` per call.
    ///
    /// A page may be empty while the returned cursor is still non-zero; callers
    /// keep going until the cursor comes back as zero.
    async fn scan(
        &self,
        cursor: ScanCursor,
        prefix: &str,
        page_size: u32,
    ) -> Result<ScanPage, CacheError>;

    /// Remove the given keys, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;
}
