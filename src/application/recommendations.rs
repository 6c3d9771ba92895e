//! Recommendation engine: interaction recording, cache-aside reads, the
//! best-effort writer, bulk recompute with cache invalidation, and trending.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use metrics::{counter, histogram};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::application::repos::{EventFilter, EventStore, RecommendationStore, RepoError};
use crate::cache::{CacheConfig, CacheError, KvCache, ScanCursor};
use crate::domain::entities::{InteractionEvent, ProductScore, UserRecommendationSet};
use crate::domain::error::DomainError;
use crate::domain::scoring::{ScoreScope, rank_products};
use crate::domain::types::EventType;

/// Lifetime of a cached per-user list.
pub const RECOMMENDATION_CACHE_TTL: Duration = Duration::from_secs(12 * 60 * 60);

const METRIC_CACHE_HIT: &str = "trendline_cache_hit_total";
const METRIC_CACHE_MISS: &str = "trendline_cache_miss_total";
const METRIC_CACHE_PAYLOAD_ERROR: &str = "trendline_cache_payload_error_total";
const METRIC_CACHE_INVALIDATED: &str = "trendline_cache_invalidated_keys_total";
const METRIC_RECOMPUTE_USERS: &str = "trendline_recompute_users_total";
const METRIC_RECOMPUTE_MS: &str = "trendline_recompute_ms";

#[derive(Debug, Error)]
pub enum RecommendationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Cache purge that stopped part way; `removed` keys were already deleted.
#[derive(Debug, Error)]
#[error("cache invalidation stopped after removing {removed} keys")]
pub struct InvalidationError {
    pub removed: u64,
    #[source]
    pub source: CacheError,
}

/// Raw, unvalidated interaction as received from a caller.
#[derive(Debug, Clone)]
pub struct RecordInteractionCommand {
    pub user_id: String,
    pub product_id: String,
    pub event_type: String,
}

/// Where a per-user list was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOrigin {
    Cache,
    Store,
    /// Nothing cached and nothing stored (or an empty stored list).
    Empty,
}

/// Untruncated result of a cache-aside read.
#[derive(Debug, Clone)]
pub struct RecommendationLookup {
    pub set: UserRecommendationSet,
    pub origin: ReadOrigin,
}

impl RecommendationLookup {
    /// Only lists served by the store are worth writing back to the cache.
    pub fn needs_cache_fill(&self) -> bool {
        self.origin == ReadOrigin::Store
    }

    pub fn truncated(self, limit: usize) -> UserRecommendationSet {
        self.set.truncated(limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecomputeOutcome {
    /// Every user was processed.
    Completed,
    /// The distinct-user query failed; no user was processed.
    UserListUnavailable,
    /// Processing stopped at this user; remaining users were skipped.
    Aborted { user_id: String },
}

impl RecomputeOutcome {
    fn label(&self) -> &'static str {
        match self {
            RecomputeOutcome::Completed => "completed",
            RecomputeOutcome::UserListUnavailable => "user_list_unavailable",
            RecomputeOutcome::Aborted { .. } => "aborted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationStatus {
    /// Not attempted because the run aborted.
    Skipped,
    Completed { keys: u64 },
    /// Scan or delete failed after `keys` had been removed.
    Failed { keys: u64 },
}

/// Summary of one bulk recompute run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecomputeReport {
    pub users_processed: usize,
    pub outcome: RecomputeOutcome,
    pub invalidation: InvalidationStatus,
}

#[derive(Clone)]
pub struct RecommendationService {
    events: Arc<dyn EventStore>,
    store: Arc<dyn RecommendationStore>,
    cache: Arc<dyn KvCache>,
    config: CacheConfig,
}

impl RecommendationService {
    pub fn new(
        events: Arc<dyn EventStore>,
        store: Arc<dyn RecommendationStore>,
        cache: Arc<dyn KvCache>,
        config: CacheConfig,
    ) -> Self {
        Self {
            events,
            store,
            cache,
            config,
        }
    }

    pub fn cache_config(&self) -> &CacheConfig {
        &self.config
    }

    /// Validate and append one interaction stamped with the current UTC time.
    #[instrument(skip(self, command), fields(user_id = %command.user_id))]
    pub async fn record_interaction(
        &self,
        command: RecordInteractionCommand,
    ) -> Result<InteractionEvent, RecommendationError> {
        let user_id = command.user_id.trim();
        if user_id.is_empty() {
            return Err(DomainError::validation("userId", "must not be empty").into());
        }

        let product_id = Uuid::parse_str(command.product_id.trim()).map_err(|err| {
            DomainError::validation("productId", format!("not a valid UUID: {err}"))
        })?;
        let event_type = EventType::try_from(command.event_type.trim())?;

        let event = InteractionEvent::now(user_id, product_id, event_type);
        self.events.append(&event).await?;

        debug!(
            target = "trendline::recommendations",
            product_id = %event.product_id,
            event_type = %event.event_type,
            "Recorded interaction"
        );
        Ok(event)
    }

    /// Cache-aside read of a user's full list; never writes the cache.
    pub async fn lookup(&self, user_id: &str) -> Result<RecommendationLookup, RecommendationError> {
        let key = self.config.namespace.user_recommendations_key(user_id);

        match self.cache.get(&key).await {
            Ok(Some(payload)) => match serde_json::from_slice::<Vec<ProductScore>>(&payload) {
                Ok(products) => {
                    counter!(METRIC_CACHE_HIT).increment(1);
                    return Ok(RecommendationLookup {
                        set: UserRecommendationSet::new(user_id, products),
                        origin: ReadOrigin::Cache,
                    });
                }
                Err(err) => {
                    counter!(METRIC_CACHE_PAYLOAD_ERROR).increment(1);
                    warn!(
                        target = "trendline::recommendations",
                        key = %key,
                        error = %err,
                        "Discarding malformed cached recommendations"
                    );
                }
            },
            Ok(None) => {
                counter!(METRIC_CACHE_MISS).increment(1);
            }
            Err(err) => {
                counter!(METRIC_CACHE_MISS).increment(1);
                warn!(
                    target = "trendline::recommendations",
                    key = %key,
                    error = %err,
                    "Cache read failed; falling back to store"
                );
            }
        }

        let lookup = match self.store.find_user_recommendations(user_id).await? {
            Some(set) if !set.is_empty() => RecommendationLookup {
                set,
                origin: ReadOrigin::Store,
            },
            _ => RecommendationLookup {
                set: UserRecommendationSet::empty(user_id),
                origin: ReadOrigin::Empty,
            },
        };
        Ok(lookup)
    }

    /// At most `limit` leading products for the user, cache first.
    pub async fn get_user_recommendations(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<UserRecommendationSet, RecommendationError> {
        Ok(self.lookup(user_id).await?.truncated(limit))
    }

    /// Persist then cache the list. Failures are logged; the cache write is
    /// skipped when the store write fails.
    pub async fn save_user_recommendations(&self, set: &UserRecommendationSet) {
        if let Err(err) = self.store_user_recommendations(set).await {
            error!(
                target = "trendline::recommendations",
                user_id = %set.user_id,
                error = %err,
                "Failed to store user recommendations"
            );
            return;
        }

        if let Err(err) = self.cache_user_recommendations(set).await {
            warn!(
                target = "trendline::recommendations",
                user_id = %set.user_id,
                error = %err,
                "Failed to cache user recommendations"
            );
        }
    }

    pub async fn store_user_recommendations(
        &self,
        set: &UserRecommendationSet,
    ) -> Result<(), RepoError> {
        self.store.upsert_user_recommendations(set).await
    }

    pub async fn cache_user_recommendations(
        &self,
        set: &UserRecommendationSet,
    ) -> Result<(), CacheError> {
        let key = self.config.namespace.user_recommendations_key(&set.user_id);
        let payload = serde_json::to_vec(&set.products)
            .map_err(|err| CacheError::payload(&key, err.to_string()))?;
        self.cache
            .set_with_ttl(&key, Bytes::from(payload), RECOMMENDATION_CACHE_TTL)
            .await
    }

    /// Recompute and store every user's list, then purge the per-user cache keys.
    ///
    /// The first aggregation or store failure stops the run and leaves the
    /// cache untouched. A failed user listing still purges the cache.
    #[instrument(skip(self))]
    pub async fn recalculate_all_users(&self) -> RecomputeReport {
        let started_at = Instant::now();

        let user_ids = match self.events.distinct_user_ids().await {
            Ok(user_ids) => user_ids,
            Err(err) => {
                error!(
                    target = "trendline::recompute",
                    error = %err,
                    "Failed to list users for recompute"
                );
                let invalidation = self.invalidate_logged().await;
                return self.finish(
                    started_at,
                    0,
                    RecomputeOutcome::UserListUnavailable,
                    invalidation,
                );
            }
        };

        info!(
            target = "trendline::recompute",
            users = user_ids.len(),
            "Starting recompute"
        );

        let mut processed = 0;
        for user_id in user_ids {
            if let Err(err) = self.recompute_user(&user_id).await {
                error!(
                    target = "trendline::recompute",
                    user_id = %user_id,
                    processed,
                    error = %err,
                    "Recompute aborted"
                );
                return self.finish(
                    started_at,
                    processed,
                    RecomputeOutcome::Aborted { user_id },
                    InvalidationStatus::Skipped,
                );
            }
            processed += 1;
        }

        let invalidation = self.invalidate_logged().await;
        self.finish(
            started_at,
            processed,
            RecomputeOutcome::Completed,
            invalidation,
        )
    }

    async fn recompute_user(&self, user_id: &str) -> Result<(), RepoError> {
        let aggregates = self
            .events
            .aggregate_by_product(&EventFilter::for_user(user_id))
            .await?;
        let products = rank_products(aggregates, ScoreScope::User);
        self.store_user_recommendations(&UserRecommendationSet::new(user_id, products))
            .await
    }

    fn finish(
        &self,
        started_at: Instant,
        users_processed: usize,
        outcome: RecomputeOutcome,
        invalidation: InvalidationStatus,
    ) -> RecomputeReport {
        counter!(METRIC_RECOMPUTE_USERS).increment(users_processed as u64);
        histogram!(METRIC_RECOMPUTE_MS, "outcome" => outcome.label())
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        info!(
            target = "trendline::recompute",
            users_processed,
            outcome = outcome.label(),
            invalidation = ?invalidation,
            "Recompute finished"
        );

        RecomputeReport {
            users_processed,
            outcome,
            invalidation,
        }
    }

    async fn invalidate_logged(&self) -> InvalidationStatus {
        match self.invalidate_user_recommendation_cache().await {
            Ok(keys) => InvalidationStatus::Completed { keys },
            Err(err) => {
                error!(
                    target = "trendline::recompute",
                    removed = err.removed,
                    error = %err.source,
                    "Failed to invalidate recommendation cache"
                );
                InvalidationStatus::Failed { keys: err.removed }
            }
        }
    }

    /// Delete every `{namespace}:user_recommendations:*` key, page by page,
    /// until the scan cursor returns to zero.
    pub async fn invalidate_user_recommendation_cache(&self) -> Result<u64, InvalidationError> {
        let prefix = self.config.namespace.user_recommendations_prefix();
        let page_size = self.config.scan_page_size.get();
        let mut cursor = ScanCursor::START;
        let mut removed = 0;

        loop {
            let page = self
                .cache
                .scan(cursor, &prefix, page_size)
                .await
                .map_err(|source| InvalidationError { removed, source })?;
            if !page.keys.is_empty() {
                let deleted = self
                    .cache
                    .delete(&page.keys)
                    .await
                    .map_err(|source| InvalidationError { removed, source })?;
                removed += deleted;
                counter!(METRIC_CACHE_INVALIDATED).increment(deleted);
            }
            if page.next.is_complete() {
                return Ok(removed);
            }
            cursor = page.next;
        }
    }

    /// Global ranking over every recorded event. Always computed from the store.
    pub async fn trending_recommendations(&self) -> Result<Vec<ProductScore>, RecommendationError> {
        let aggregates = self.events.aggregate_by_product(&EventFilter::all()).await?;
        Ok(rank_products(aggregates, ScoreScope::Trending))
    }

    /// Probe the event store and the cache independently.
    pub async fn health(&self) -> HealthStatus {
        let database = match self.events.health_check().await {
            Ok(()) => true,
            Err(err) => {
                warn!(target = "trendline::health", error = %err, "Event store health check failed");
                false
            }
        };
        let cache = match self.cache.ping().await {
            Ok(()) => true,
            Err(err) => {
                warn!(target = "trendline::health", error = %err, "Cache ping failed");
                false
            }
        };
        HealthStatus { database, cache }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthStatus {
    pub database: bool,
    pub cache: bool,
}
