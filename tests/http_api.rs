//! HTTP surface exercised through `tower::ServiceExt::oneshot`.

mod support;

use std::num::NonZeroU32;
use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use support::Harness;
use tower::ServiceExt;
use trendline::application::jobs::{TaskQueue, TaskReceiver, spawn_task_worker, task_queue};
use trendline::domain::entities::{ProductScore, UserRecommendationSet};
use trendline::infra::http::{HttpState, REQUEST_ID_HEADER, USER_ID_HEADER, build_router};
use uuid::Uuid;

fn router(h: &Harness) -> (Router, TaskQueue, TaskReceiver) {
    let (tasks, receiver) = task_queue(16);
    let router = build_router(HttpState {
        service: h.service.clone(),
        tasks: tasks.clone(),
        default_limit: NonZeroU32::new(10).expect("non-zero"),
    });
    (router, tasks, receiver)
}

fn get(uri: &str, user: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(user) = user {
        builder = builder.header(USER_ID_HEADER, user);
    }
    builder.body(Body::empty()).expect("request should build")
}

fn post_json(uri: &str, user: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(user) = user {
        builder = builder.header(USER_ID_HEADER, user);
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("request should build")
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, body)
}

fn products(n: usize) -> Vec<ProductScore> {
    (0..n)
        .map(|i| ProductScore {
            product_id: Uuid::new_v4(),
            score: 9.0 - i as f64,
            count: 2,
            last_interaction: time::macros::datetime!(2024-06-01 12:00 UTC),
            view_count: 2,
            cart_add_count: 0,
            purchase_count: 0,
        })
        .collect()
}

#[tokio::test]
async fn health_reports_dependency_status() {
    let h = Harness::new();
    let (router, _tasks, _receiver) = router(&h);

    let (status, body) = send(&router, get("/", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"service": "UP", "database": "UP", "cache": "UP"})
    );

    h.cache.fail_reads.store(true, Ordering::SeqCst);
    let (status, body) = send(&router, get("/", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cache"], "DOWN");
}

#[tokio::test]
async fn caller_recommendations_require_identity() {
    let h = Harness::new();
    let (router, _tasks, _receiver) = router(&h);

    let (status, body) = send(&router, get("/recommendations", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["data"], Value::Null);
    assert!(body["message"].as_str().is_some());
}

#[tokio::test]
async fn recorded_event_is_returned_in_envelope() {
    let h = Harness::new();
    let (router, _tasks, _receiver) = router(&h);
    let product = Uuid::new_v4();

    let (status, body) = send(
        &router,
        post_json(
            "/recommendations/event",
            Some("u1"),
            json!({"productId": product, "eventType": "PURCHASE"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "User interaction recorded successfully");
    assert_eq!(body["data"]["userId"], "u1");
    assert_eq!(body["data"]["productId"], product.to_string());
    assert_eq!(body["data"]["eventType"], "PURCHASE");
    assert!(body["data"]["timestamp"].as_str().is_some());
    assert_eq!(h.repos.event_count(), 1);
}

#[tokio::test]
async fn invalid_events_are_rejected() {
    let h = Harness::new();
    let (router, _tasks, _receiver) = router(&h);
    let product = Uuid::new_v4();

    let cases = [
        (Some("u1"), json!({"productId": "nope", "eventType": "VIEW"})),
        (Some("u1"), json!({"productId": product, "eventType": "LIKE"})),
        (Some("u1"), json!({"eventType": "VIEW"})),
        (None, json!({"productId": product, "eventType": "VIEW"})),
    ];
    for (user, payload) in cases {
        let (status, body) =
            send(&router, post_json("/recommendations/event", user, payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["data"], Value::Null);
    }
    assert_eq!(h.repos.event_count(), 0);
}

#[tokio::test]
async fn malformed_json_body_is_a_bad_request() {
    let h = Harness::new();
    let (router, _tasks, _receiver) = router(&h);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/recommendations/event")
        .header("content-type", "application/json")
        .header(USER_ID_HEADER, "u1")
        .body(Body::from("{"))
        .expect("request should build");
    let (status, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn user_recommendations_honor_limit_and_fallback() {
    let h = Harness::new();
    let (router, _tasks, _receiver) = router(&h);
    let stored = UserRecommendationSet::new("u7", products(12));
    h.service
        .store_user_recommendations(&stored)
        .await
        .expect("store");

    let (status, body) = send(&router, get("/recommendations/u7?limit=3", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["userId"], "u7");
    assert_eq!(body["data"]["products"].as_array().map(Vec::len), Some(3));

    for query in ["limit=abc", "limit=0", "limit=-2", ""] {
        let uri = format!("/recommendations/u7?{query}");
        let (status, body) = send(&router, get(&uri, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["products"].as_array().map(Vec::len), Some(10));
    }
}

#[tokio::test]
async fn unknown_user_gets_empty_products() {
    let h = Harness::new();
    let (router, _tasks, _receiver) = router(&h);

    let (status, body) = send(&router, get("/recommendations/nobody", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["products"], json!([]));
}

#[tokio::test]
async fn store_failure_is_an_internal_error_envelope() {
    let h = Harness::new();
    let (router, _tasks, _receiver) = router(&h);
    h.store.fail_reads.store(true, Ordering::SeqCst);

    let (status, body) = send(&router, get("/recommendations/u1", None)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Failed to get recommendations");
    assert_eq!(body["data"], Value::Null);
}

#[tokio::test]
async fn caller_read_from_store_is_written_back_to_cache() {
    let h = Harness::new();
    let (router, _tasks, receiver) = router(&h);
    let worker = spawn_task_worker(receiver, h.service.clone(), 2);

    let stored = UserRecommendationSet::new("u1", products(12));
    h.service
        .store_user_recommendations(&stored)
        .await
        .expect("store");

    let (status, body) = send(&router, get("/recommendations?limit=2", Some("u1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["products"].as_array().map(Vec::len), Some(2));

    assert!(h.wait_for_cache("u1").await, "cache filled after read");
    let cached: Vec<ProductScore> =
        serde_json::from_slice(&h.cached("u1").await.expect("cached")).expect("payload");
    assert_eq!(cached.len(), 12);

    assert!(worker.shutdown(Duration::from_secs(5)).await);
}

#[tokio::test]
async fn explicit_user_read_does_not_fill_cache() {
    let h = Harness::new();
    let (router, _tasks, receiver) = router(&h);
    let stored = UserRecommendationSet::new("u1", products(2));
    h.service
        .store_user_recommendations(&stored)
        .await
        .expect("store");

    let (status, _) = send(&router, get("/recommendations/u1", None)).await;
    assert_eq!(status, StatusCode::OK);

    let worker = spawn_task_worker(receiver, h.service.clone(), 1);
    assert!(worker.shutdown(Duration::from_secs(5)).await);
    assert!(h.cached("u1").await.is_none());
}

#[tokio::test]
async fn trending_lists_products_by_score() {
    let h = Harness::new();
    let (router, _tasks, _receiver) = router(&h);
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    h.record("u1", a, "PURCHASE", 20).await;
    h.record("u2", b, "VIEW", 5).await;

    let (status, body) = send(&router, get("/recommendations/trending", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Trending recommendations fetched successfully");
    assert_eq!(body["data"][0]["productId"], b.to_string());
    assert_eq!(body["data"][0]["score"], 8.96);
    assert_eq!(body["data"][1]["productId"], a.to_string());
    assert_eq!(body["data"][1]["score"], 7.31);
}

#[tokio::test]
async fn rebuild_responds_immediately_and_coalesces() {
    let h = Harness::new();
    let (router, _tasks, _receiver) = router(&h);

    let (status, body) = send(&router, post_json("/recommendations/rebuild", None, json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Recommendation rebuilding started");
    assert_eq!(body["data"]["status"], "queued");

    let (status, body) = send(&router, post_json("/recommendations/rebuild", None, json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "coalesced");
}

#[tokio::test]
async fn rebuild_after_shutdown_is_unavailable() {
    let h = Harness::new();
    let (router, _tasks, receiver) = router(&h);
    drop(receiver);

    let (status, body) = send(&router, post_json("/recommendations/rebuild", None, json!({}))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["data"], Value::Null);
}

#[tokio::test]
async fn request_id_is_echoed_and_unknown_routes_are_enveloped() {
    let h = Harness::new();
    let (router, _tasks, _receiver) = router(&h);

    let request = Request::builder()
        .uri("/nowhere")
        .header(REQUEST_ID_HEADER, "req-42")
        .body(Body::empty())
        .expect("request should build");
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok()),
        Some("req-42")
    );
}
