//! In-process repositories used when no database is configured.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    application::repos::{EventFilter, EventStore, RecommendationStore, RepoError},
    cache::lock::{rw_read, rw_write},
    domain::entities::{InteractionEvent, ProductCounts, UserRecommendationSet},
};

const LOCK_TARGET: &str = "trendline::infra::memory";

#[derive(Default)]
struct State {
    events: Vec<InteractionEvent>,
    recommendations: HashMap<String, UserRecommendationSet>,
}

/// Event log and recommendation store kept in process memory. Clones share
/// the same state.
#[derive(Clone, Default)]
pub struct MemoryRepositories {
    state: Arc<RwLock<State>>,
}

impl MemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_count(&self) -> usize {
        rw_read(&self.state, LOCK_TARGET, "event_count").events.len()
    }
}

#[async_trait]
impl EventStore for MemoryRepositories {
    async fn append(&self, event: &InteractionEvent) -> Result<(), RepoError> {
        rw_write(&self.state, LOCK_TARGET, "append")
            .events
            .push(event.clone());
        Ok(())
    }

    async fn distinct_user_ids(&self) -> Result<Vec<String>, RepoError> {
        let state = rw_read(&self.state, LOCK_TARGET, "distinct_user_ids");
        let mut seen = HashSet::new();
        Ok(state
            .events
            .iter()
            .filter(|event| seen.insert(event.user_id.as_str()))
            .map(|event| event.user_id.clone())
            .collect())
    }

    async fn aggregate_by_product(
        &self,
        filter: &EventFilter,
    ) -> Result<Vec<ProductCounts>, RepoError> {
        let state = rw_read(&self.state, LOCK_TARGET, "aggregate_by_product");
        let mut positions: HashMap<Uuid, usize> = HashMap::new();
        let mut aggregates: Vec<ProductCounts> = Vec::new();

        let matching = state.events.iter().filter(|event| match &filter.user_id {
            Some(user_id) => &event.user_id == user_id,
            None => true,
        });

        for event in matching {
            match positions.get(&event.product_id) {
                Some(&index) => aggregates[index].observe(event.event_type, event.timestamp),
                None => {
                    positions.insert(event.product_id, aggregates.len());
                    aggregates.push(ProductCounts::first(
                        event.product_id,
                        event.event_type,
                        event.timestamp,
                    ));
                }
            }
        }

        Ok(aggregates)
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

#[async_trait]
impl RecommendationStore for MemoryRepositories {
    async fn find_user_recommendations(
        &self,
        user_id: &str,
    ) -> Result<Option<UserRecommendationSet>, RepoError> {
        Ok(rw_read(&self.state, LOCK_TARGET, "find_user_recommendations")
            .recommendations
            .get(user_id)
            .cloned())
    }

    async fn upsert_user_recommendations(
        &self,
        set: &UserRecommendationSet,
    ) -> Result<(), RepoError> {
        rw_write(&self.state, LOCK_TARGET, "upsert_user_recommendations")
            .recommendations
            .insert(set.user_id.clone(), set.clone());
        Ok(())
    }
}
