//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::{InteractionEvent, ProductCounts, UserRecommendationSet};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Restricts an aggregation to a subset of the event log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub user_id: Option<String>,
}

impl EventFilter {
    /// Every recorded event.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
        }
    }
}

/// Append-only interaction log.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, event: &InteractionEvent) -> Result<(), RepoError>;

    async fn distinct_user_ids(&self) -> Result<Vec<String>, RepoError>;

    /// Per-product tallies over the filtered events, in a stable store-defined
    /// order (first interaction first).
    async fn aggregate_by_product(
        &self,
        filter: &EventFilter,
    ) -> Result<Vec<ProductCounts>, RepoError>;

    async fn health_check(&self) -> Result<(), RepoError>;
}

/// Durable per-user recommendation lists, keyed by user id.
#[async_trait]
pub trait RecommendationStore: Send + Sync {
    async fn find_user_recommendations(
        &self,
        user_id: &str,
    ) -> Result<Option<UserRecommendationSet>, RepoError>;

    /// Replace the user's stored list wholesale.
    async fn upsert_user_recommendations(
        &self,
        set: &UserRecommendationSet,
    ) -> Result<(), RepoError>;
}
