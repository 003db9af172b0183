//! HTTP API tests driven through the router without a socket

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{HarnessBuilder, Harness};
use dailyquill::server::{create_router, AppState};

async fn setup() -> (Router, Harness) {
    let harness = HarnessBuilder::new()
        .daily_target(1)
        .languages(&["es"])
        .build()
        .await;
    let router = create_router(AppState::new(harness.orchestrator.clone()));
    (router, harness)
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let (router, _) = setup().await;
    let (status, body) = send(&router, get("/api/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["store_ok"], true);
    assert_eq!(body["data"]["job_in_flight"], false);
}

#[tokio::test]
async fn test_translate_rejects_out_of_range_chunk_count() {
    let (router, harness) = setup().await;

    for value in [json!(15), json!(-1)] {
        let (status, body) = send(
            &router,
            post_json(
                "/api/translate",
                json!({ "slug": "some-article", "language": "es", "max_chunks": value }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "invalid_chunk_count");
        assert_eq!(body["context"]["slug"], "some-article");
        assert_eq!(body["context"]["language"], "es");
        assert_eq!(body["context"]["chunk_count"], value);
    }
    assert_eq!(harness.total_calls(), 0);
}

#[tokio::test]
async fn test_translate_rejects_non_integer_chunk_count() {
    let (router, _) = setup().await;

    for value in [json!(2.5), json!("3")] {
        let (status, body) = send(
            &router,
            post_json(
                "/api/translate",
                json!({ "slug": "some-article", "language": "es", "max_chunks": value }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
    }
}

#[tokio::test]
async fn test_translate_unknown_master_is_404() {
    let (router, _) = setup().await;
    let (status, body) = send(
        &router,
        post_json("/api/translate", json!({ "slug": "missing", "language": "es" })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
    assert_eq!(body["context"]["slug"], "missing");
}

#[tokio::test]
async fn test_generate_then_translate_then_conflict() {
    let (router, _) = setup().await;

    let (status, body) = send(
        &router,
        post_json("/api/generate", json!({ "category": "health" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["outcome"], "inserted");
    let slug = body["data"]["article"]["slug"].as_str().unwrap().to_string();

    let (status, body) = send(&router, get(&format!("/api/articles/en/{slug}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["slug"], slug.as_str());

    let request = json!({ "slug": slug, "language": "es", "max_chunks": 2 });
    let (status, body) = send(&router, post_json("/api/translate", request.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["language"], "es");
    assert_eq!(body["data"]["chunk_count"], 2);

    let (status, body) = send(&router, post_json("/api/translate", request)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, body) = send(&router, get("/api/status/today")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["completed"], 1);
    assert_eq!(body["data"]["remaining"], 0);
}

#[tokio::test]
async fn test_generate_unknown_category_is_404() {
    let (router, _) = setup().await;
    let (status, body) = send(
        &router,
        post_json("/api/generate", json!({ "category": "gardening" })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["context"]["category"], "gardening");
}

#[tokio::test]
async fn test_missing_article_is_404() {
    let (router, _) = setup().await;
    let (status, body) = send(&router, get("/api/articles/es/nothing-here")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_manual_run_waits_for_report() {
    let (router, _) = setup().await;
    let (status, body) = send(
        &router,
        Request::builder()
            .method("POST")
            .uri("/api/runs?wait=true")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["trigger"], "manual");
    assert_eq!(body["data"]["status"], "complete");
    assert_eq!(body["data"]["masters_committed"], 1);

    let (status, body) = send(&router, get("/api/runs")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["last_run"]["status"], "complete");
}

#[tokio::test]
async fn test_background_run_is_accepted() {
    let (router, _) = setup().await;
    let (status, body) = send(
        &router,
        Request::builder()
            .method("POST")
            .uri("/api/runs")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body["data"]["run_id"].is_string());
}

#[tokio::test]
async fn test_categories_and_metrics() {
    let (router, _) = setup().await;

    let (status, body) = send(&router, get("/api/categories")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["slug"], "health");

    let response = router.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
