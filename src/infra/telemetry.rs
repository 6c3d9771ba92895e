use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "trendline_cache_hit_total",
            Unit::Count,
            "Per-user recommendation reads served from the cache."
        );
        describe_counter!(
            "trendline_cache_miss_total",
            Unit::Count,
            "Per-user recommendation reads that fell back to the store."
        );
        describe_counter!(
            "trendline_cache_payload_error_total",
            Unit::Count,
            "Cached recommendation payloads that failed to decode."
        );
        describe_counter!(
            "trendline_cache_invalidated_keys_total",
            Unit::Count,
            "Per-user cache keys removed by invalidation."
        );
        describe_counter!(
            "trendline_recompute_users_total",
            Unit::Count,
            "Users whose recommendations were recomputed."
        );
        describe_histogram!(
            "trendline_recompute_ms",
            Unit::Milliseconds,
            "Bulk recompute duration in milliseconds."
        );
        describe_counter!(
            "trendline_task_dropped_total",
            Unit::Count,
            "Background tasks dropped because the queue was full."
        );
        describe_counter!(
            "trendline_task_coalesced_total",
            Unit::Count,
            "Recompute requests absorbed by an already pending recompute."
        );
        describe_counter!(
            "trendline_task_completed_total",
            Unit::Count,
            "Background tasks run to completion."
        );
    });
}
