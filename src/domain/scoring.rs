//! Score formula turning per-product event counts into a bounded, comparable value.

use super::entities::{ProductCounts, ProductScore};

/// Upper bound of every emitted score.
pub const MAX_SCORE: f64 = 10.0;

/// Weighting scheme applied to the event counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreScope {
    /// One user's own interactions. Purchases dominate.
    User,
    /// Every user's interactions. Views dominate.
    Trending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventWeights {
    pub view: u64,
    pub cart_add: u64,
    pub purchase: u64,
}

impl ScoreScope {
    pub const fn weights(self) -> EventWeights {
        match self {
            ScoreScope::User => EventWeights {
                view: 1,
                cart_add: 3,
                purchase: 5,
            },
            ScoreScope::Trending => EventWeights {
                view: 5,
                cart_add: 3,
                purchase: 2,
            },
        }
    }
}

/// Volume multiplier; each tier is inclusive at its lower edge.
pub fn count_factor(count: u64) -> f64 {
    match count {
        100.. => 2.0,
        50..=99 => 1.5,
        10..=49 => 1.2,
        _ => 1.0,
    }
}

pub fn score(counts: &ProductCounts, scope: ScoreScope) -> f64 {
    if counts.count == 0 {
        return 0.0;
    }

    let weights = scope.weights();
    let raw = weights.view * counts.view_count
        + weights.cart_add * counts.cart_add_count
        + weights.purchase * counts.purchase_count;
    let count = counts.count as f64;
    let value = (raw as f64 / count) * count_factor(counts.count) * (count + 1.0).ln();

    round2(value.min(MAX_SCORE))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Score every aggregate and order the result by descending score.
///
/// Zero-count aggregates are skipped. The sort is stable, so equal scores keep
/// the order in which the aggregation produced them.
pub fn rank_products(aggregates: Vec<ProductCounts>, scope: ScoreScope) -> Vec<ProductScore> {
    let mut ranked: Vec<ProductScore> = aggregates
        .into_iter()
        .filter(|counts| counts.count > 0)
        .map(|counts| ProductScore {
            product_id: counts.product_id,
            score: score(&counts, scope),
            count: counts.count,
            last_interaction: counts.last_interaction,
            view_count: counts.view_count,
            cart_add_count: counts.cart_add_count,
            purchase_count: counts.purchase_count,
        })
        .collect();

    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked
}
