//! Shared fixtures for the integration tests: in-process adapters plus
//! wrappers that fail on demand.
#![allow(dead_code)]

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use trendline::application::recommendations::{RecommendationService, RecordInteractionCommand};
use trendline::application::repos::{EventFilter, EventStore, RecommendationStore, RepoError};
use trendline::cache::{CacheConfig, CacheError, KvCache, MemoryCache, ScanCursor, ScanPage};
use trendline::domain::entities::{InteractionEvent, ProductCounts, UserRecommendationSet};
use trendline::infra::memory::MemoryRepositories;
use uuid::Uuid;

pub struct Harness {
    pub service: Arc<RecommendationService>,
    pub repos: MemoryRepositories,
    pub events: Arc<FlakyEvents>,
    pub store: Arc<FlakyStore>,
    pub cache: Arc<FlakyCache>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    pub fn with_config(config: CacheConfig) -> Self {
        let repos = MemoryRepositories::new();
        let events = Arc::new(FlakyEvents::new(repos.clone()));
        let store = Arc::new(FlakyStore::new(repos.clone()));
        let cache = Arc::new(FlakyCache::new(MemoryCache::new(
            NonZeroUsize::new(1_000).expect("non-zero capacity"),
        )));
        let service = Arc::new(RecommendationService::new(
            events.clone(),
            store.clone(),
            cache.clone(),
            config,
        ));
        Self {
            service,
            repos,
            events,
            store,
            cache,
        }
    }

    pub fn key(&self, user_id: &str) -> String {
        self.service
            .cache_config()
            .namespace
            .user_recommendations_key(user_id)
    }

    pub async fn record(&self, user_id: &str, product_id: Uuid, event_type: &str, times: usize) {
        for _ in 0..times {
            self.service
                .record_interaction(RecordInteractionCommand {
                    user_id: user_id.to_string(),
                    product_id: product_id.to_string(),
                    event_type: event_type.to_string(),
                })
                .await
                .expect("interaction recorded");
        }
    }

    pub async fn cached(&self, user_id: &str) -> Option<Bytes> {
        self.cache
            .inner
            .get(&self.key(user_id))
            .await
            .expect("memory cache get")
    }

    pub async fn stored(&self, user_id: &str) -> Option<UserRecommendationSet> {
        self.repos
            .find_user_recommendations(user_id)
            .await
            .expect("memory store read")
    }

    /// Poll until the user's cache entry appears.
    pub async fn wait_for_cache(&self, user_id: &str) -> bool {
        for _ in 0..100 {
            if self.cached(user_id).await.is_some() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

fn injected(what: &str) -> RepoError {
    RepoError::from_persistence(format!("injected {what} failure"))
}

/// Event store that can refuse to list users or to aggregate for one user.
pub struct FlakyEvents {
    inner: MemoryRepositories,
    pub fail_user_listing: AtomicBool,
    pub fail_aggregate_for: Mutex<Option<String>>,
}

impl FlakyEvents {
    fn new(inner: MemoryRepositories) -> Self {
        Self {
            inner,
            fail_user_listing: AtomicBool::new(false),
            fail_aggregate_for: Mutex::new(None),
        }
    }
}

#[async_trait]
impl EventStore for FlakyEvents {
    async fn append(&self, event: &InteractionEvent) -> Result<(), RepoError> {
        self.inner.append(event).await
    }

    async fn distinct_user_ids(&self) -> Result<Vec<String>, RepoError> {
        if self.fail_user_listing.load(Ordering::SeqCst) {
            return Err(injected("user listing"));
        }
        self.inner.distinct_user_ids().await
    }

    async fn aggregate_by_product(
        &self,
        filter: &EventFilter,
    ) -> Result<Vec<ProductCounts>, RepoError> {
        let failing = self.fail_aggregate_for.lock().expect("lock").clone();
        if failing.is_some() && failing == filter.user_id {
            return Err(injected("aggregation"));
        }
        self.inner.aggregate_by_product(filter).await
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        self.inner.health_check().await
    }
}

/// Recommendation store that can fail reads, or upserts for one user.
pub struct FlakyStore {
    inner: MemoryRepositories,
    pub fail_reads: AtomicBool,
    pub fail_upsert_for: Mutex<Option<String>>,
}

impl FlakyStore {
    fn new(inner: MemoryRepositories) -> Self {
        Self {
            inner,
            fail_reads: AtomicBool::new(false),
            fail_upsert_for: Mutex::new(None),
        }
    }
}

#[async_trait]
impl RecommendationStore for FlakyStore {
    async fn find_user_recommendations(
        &self,
        user_id: &str,
    ) -> Result<Option<UserRecommendationSet>, RepoError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(injected("store read"));
        }
        self.inner.find_user_recommendations(user_id).await
    }

    async fn upsert_user_recommendations(
        &self,
        set: &UserRecommendationSet,
    ) -> Result<(), RepoError> {
        let failing = self.fail_upsert_for.lock().expect("lock").clone();
        if failing.as_deref() == Some(set.user_id.as_str()) {
            return Err(injected("store write"));
        }
        self.inner.upsert_user_recommendations(set).await
    }
}

/// Cache wrapper whose reads, pings or deletes can be made to fail.
pub struct FlakyCache {
    pub inner: MemoryCache,
    pub fail_reads: AtomicBool,
    pub fail_deletes: AtomicBool,
}

impl FlakyCache {
    fn new(inner: MemoryCache) -> Self {
        Self {
            inner,
            fail_reads: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl KvCache for FlakyCache {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CacheError::backend("injected read failure"));
        }
        self.inner.get(key).await
    }

    async fn set_with_ttl(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        self.inner.set_with_ttl(key, value, ttl).await
    }

    async fn scan(
        &self,
        cursor: ScanCursor,
        prefix: &str,
        page_size: u32,
    ) -> Result<ScanPage, CacheError> {
        self.inner.scan(cursor, prefix, page_size).await
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(CacheError::backend("injected delete failure"));
        }
        self.inner.delete(keys).await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CacheError::backend("injected ping failure"));
        }
        self.inner.ping().await
    }
}
