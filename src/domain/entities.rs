//! Records exchanged between the stores, the cache and the HTTP surface.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::types::EventType;

/// A single recorded interaction. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionEvent {
    pub user_id: String,
    pub product_id: Uuid,
    pub event_type: EventType,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl InteractionEvent {
    pub fn now(user_id: impl Into<String>, product_id: Uuid, event_type: EventType) -> Self {
        Self {
            user_id: user_id.into(),
            product_id,
            event_type,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// Per-product event tallies over one scope (a single user, or every user).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductCounts {
    pub product_id: Uuid,
    pub count: u64,
    pub view_count: u64,
    pub cart_add_count: u64,
    pub purchase_count: u64,
    pub last_interaction: OffsetDateTime,
}

impl ProductCounts {
    /// Start a tally from the first observed event.
    pub fn first(product_id: Uuid, event_type: EventType, at: OffsetDateTime) -> Self {
        let mut counts = Self {
            product_id,
            count: 0,
            view_count: 0,
            cart_add_count: 0,
            purchase_count: 0,
            last_interaction: at,
        };
        counts.observe(event_type, at);
        counts
    }

    pub fn observe(&mut self, event_type: EventType, at: OffsetDateTime) {
        self.count += 1;
        match event_type {
            EventType::View => self.view_count += 1,
            EventType::CartAdd => self.cart_add_count += 1,
            EventType::Purchase => self.purchase_count += 1,
        }
        if at > self.last_interaction {
            self.last_interaction = at;
        }
    }
}

/// Scored product entry as served to callers and stored per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductScore {
    pub product_id: Uuid,
    pub score: f64,
    pub count: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub last_interaction: OffsetDateTime,
    pub view_count: u64,
    pub cart_add_count: u64,
    pub purchase_count: u64,
}

/// Ordered recommendation list for one user, highest score first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecommendationSet {
    pub user_id: String,
    pub products: Vec<ProductScore>,
}

impl UserRecommendationSet {
    pub fn new(user_id: impl Into<String>, products: Vec<ProductScore>) -> Self {
        Self {
            user_id: user_id.into(),
            products,
        }
    }

    pub fn empty(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Keep at most `limit` leading products.
    pub fn truncated(mut self, limit: usize) -> Self {
        self.products.truncate(limit);
        self
    }
}
