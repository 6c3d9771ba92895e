use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Path, Query, State};
use axum::response::IntoResponse;
use tracing::debug;

use crate::application::jobs::{BackgroundTask, RecomputeTrigger, SubmitOutcome};
use crate::application::recommendations::RecordInteractionCommand;

use super::HttpState;
use super::error::{ApiError, codes};
use super::middleware::CallerIdentity;
use super::models::{
    Envelope, HealthResponse, LimitQuery, RebuildResponse, RecordEventRequest,
};

pub async fn health(State(state): State<HttpState>) -> impl IntoResponse {
    Json(HealthResponse::from(state.service.health().await))
}

/// Recommendations for the calling user. A list read from the store is handed
/// back to the writer so the next read is served from the cache.
pub async fn caller_recommendations(
    State(state): State<HttpState>,
    Extension(identity): Extension<CallerIdentity>,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = identity.user_id.ok_or_else(ApiError::missing_identity)?;
    let limit = query.resolve(state.default_limit);

    let lookup = state
        .service
        .lookup(&user_id)
        .await
        .map_err(|err| ApiError::from_recommendation("Failed to get recommendations", err))?;

    if lookup.needs_cache_fill() {
        let outcome = state
            .tasks
            .submit(BackgroundTask::SaveRecommendations(lookup.set.clone()));
        debug!(
            target = "trendline::http",
            user_id = %user_id,
            outcome = ?outcome,
            "Submitted save-after-read"
        );
    }

    Ok(Json(Envelope::success(
        "Recommendations fetched successfully",
        lookup.truncated(limit),
    )))
}

pub async fn user_recommendations(
    State(state): State<HttpState>,
    Path(user_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.resolve(state.default_limit);
    let set = state
        .service
        .get_user_recommendations(&user_id, limit)
        .await
        .map_err(|err| ApiError::from_recommendation("Failed to get recommendations", err))?;

    Ok(Json(Envelope::success(
        "Recommendations fetched successfully",
        set,
    )))
}

pub async fn trending(State(state): State<HttpState>) -> Result<impl IntoResponse, ApiError> {
    let products = state.service.trending_recommendations().await.map_err(|err| {
        ApiError::from_recommendation("Failed to get trending recommendations", err)
    })?;

    Ok(Json(Envelope::success(
        "Trending recommendations fetched successfully",
        products,
    )))
}

/// Queue a full recompute and return without waiting for it.
pub async fn rebuild(State(state): State<HttpState>) -> Result<impl IntoResponse, ApiError> {
    let status = match state.tasks.submit(BackgroundTask::RecalculateAll {
        trigger: RecomputeTrigger::Api,
    }) {
        SubmitOutcome::Queued => "queued",
        SubmitOutcome::Coalesced => "coalesced",
        SubmitOutcome::Dropped => {
            return Err(ApiError::queue_unavailable(
                "Background queue is full; rebuild not started",
            ));
        }
        SubmitOutcome::Closed => {
            return Err(ApiError::queue_unavailable(
                "Background queue is shutting down; rebuild not started",
            ));
        }
    };

    Ok(Json(Envelope::success(
        "Recommendation rebuilding started",
        RebuildResponse { status },
    )))
}

pub async fn record_event(
    State(state): State<HttpState>,
    Extension(identity): Extension<CallerIdentity>,
    payload: Result<Json<RecordEventRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload.map_err(ApiError::invalid_payload)?;
    let user_id = identity.user_id.ok_or_else(ApiError::missing_identity)?;

    let event = state
        .service
        .record_interaction(RecordInteractionCommand {
            user_id,
            product_id: payload.product_id,
            event_type: payload.event_type,
        })
        .await
        .map_err(|err| ApiError::from_recommendation("Failed to record user interaction", err))?;

    Ok(Json(Envelope::success(
        "User interaction recorded successfully",
        event,
    )))
}

pub async fn not_found() -> ApiError {
    ApiError::new(
        axum::http::StatusCode::NOT_FOUND,
        codes::NOT_FOUND,
        "Route not found",
    )
}
