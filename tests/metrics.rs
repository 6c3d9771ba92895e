//! Metric names emitted by the read path, recompute, and task queue.

mod support;

use std::collections::HashSet;
use std::time::Duration;

use bytes::Bytes;
use metrics_util::debugging::DebuggingRecorder;
use support::Harness;
use trendline::application::jobs::{
    BackgroundTask, RecomputeTrigger, spawn_task_worker, task_queue,
};
use trendline::cache::KvCache;
use trendline::domain::entities::UserRecommendationSet;
use uuid::Uuid;

#[tokio::test]
async fn engine_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let h = Harness::new();
    h.record("u1", Uuid::new_v4(), "VIEW", 2).await;

    // miss, then hit
    h.service
        .store_user_recommendations(&UserRecommendationSet::empty("u2"))
        .await
        .expect("store");
    h.service.lookup("u2").await.expect("miss");
    h.service
        .cache_user_recommendations(&UserRecommendationSet::empty("u2"))
        .await
        .expect("cache");
    h.service.lookup("u2").await.expect("hit");

    // payload error
    h.cache
        .inner
        .set_with_ttl(&h.key("u3"), Bytes::from_static(b"oops"), Duration::from_secs(60))
        .await
        .expect("seed");
    h.service.lookup("u3").await.expect("fallback");

    // recompute + invalidation
    h.service.recalculate_all_users().await;

    // queue: completed, coalesced, dropped
    let (tasks, receiver) = task_queue(1);
    tasks.submit(BackgroundTask::RecalculateAll {
        trigger: RecomputeTrigger::Api,
    });
    tasks.submit(BackgroundTask::RecalculateAll {
        trigger: RecomputeTrigger::Schedule,
    });
    tasks.submit(BackgroundTask::SaveRecommendations(
        UserRecommendationSet::empty("u4"),
    ));
    let worker = spawn_task_worker(receiver, h.service.clone(), 1);
    assert!(worker.shutdown(Duration::from_secs(5)).await);

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "trendline_cache_hit_total",
        "trendline_cache_miss_total",
        "trendline_cache_payload_error_total",
        "trendline_cache_invalidated_keys_total",
        "trendline_recompute_users_total",
        "trendline_recompute_ms",
        "trendline_task_dropped_total",
        "trendline_task_coalesced_total",
        "trendline_task_completed_total",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
