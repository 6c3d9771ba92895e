//! HTTP surface: health, per-user and trending reads, rebuild, event intake.

mod error;
mod handlers;
mod middleware;
mod models;

pub use error::{ApiError, codes};
pub use middleware::{CallerIdentity, REQUEST_ID_HEADER, USER_ID_HEADER, USER_ROLE_HEADER};

use std::num::NonZeroU32;
use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::application::jobs::TaskQueue;
use crate::application::recommendations::RecommendationService;

use middleware::{identify_caller, log_responses, set_request_context};

#[derive(Clone)]
pub struct HttpState {
    pub service: Arc<RecommendationService>,
    pub tasks: TaskQueue,
    pub default_limit: NonZeroU32,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(handlers::health))
        .route("/recommendations", get(handlers::caller_recommendations))
        .route("/recommendations/trending", get(handlers::trending))
        .route("/recommendations/rebuild", post(handlers::rebuild))
        .route("/recommendations/event", post(handlers::record_event))
        .route("/recommendations/{user_id}", get(handlers::user_recommendations))
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(axum_middleware::from_fn(identify_caller))
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
