//! Integration Tests for API Endpoints
//!
//! Tests full request/response cycle for each endpoint, plus the rate
//! limiting middleware in front of them.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Request, Response, StatusCode},
    Router,
};
use serde_json::Value;
use tagcache::{
    api::create_router, AppState, Cache, CacheConfig, Config, RateLimitConfig, RateLimiter,
};
use tower::ServiceExt;

// == Helper Functions ==

fn create_test_app() -> Router {
    let state = AppState::from_config(&Config::default()).unwrap();
    create_router(state)
}

fn create_limited_app(max_requests: u32) -> Router {
    let caches = ["translation", "api", "content"]
        .into_iter()
        .map(|name| Cache::new(name, CacheConfig::default()).unwrap())
        .collect();
    let rate_limit = RateLimitConfig {
        max_requests,
        window: Duration::from_secs(60),
        ..RateLimitConfig::default()
    };
    let state = AppState::new(caches, Arc::new(RateLimiter::new()), rate_limit).unwrap();
    create_router(state)
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<&str>) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    app.clone().oneshot(builder.body(body).unwrap()).await.unwrap()
}

// == SET / GET ==

#[tokio::test]
async fn test_set_then_get() {
    let app = create_test_app();

    let response = send(
        &app,
        "PUT",
        "/cache/api",
        Some(r#"{"key":"user:1","value":{"name":"ada"},"tags":["users"]}"#),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert!(json["message"].as_str().unwrap().contains("user:1"));

    let response = send(&app, "GET", "/cache/api/user:1", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["key"], "user:1");
    assert_eq!(json["value"]["name"], "ada");
    assert!(json["ttl_remaining_ms"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_get_missing_key() {
    let app = create_test_app();

    let response = send(&app, "GET", "/cache/api/nonexistent", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_to_json(response.into_body()).await;
    assert!(json.get("error").is_some());
}

#[tokio::test]
async fn test_unknown_cache_name() {
    let app = create_test_app();

    let response = send(
        &app,
        "PUT",
        "/cache/sessions",
        Some(r#"{"key":"k","value":1}"#),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_named_caches_are_isolated() {
    let app = create_test_app();

    send(
        &app,
        "PUT",
        "/cache/translation",
        Some(r#"{"key":"greeting","value":"bonjour"}"#),
    )
    .await;

    let response = send(&app, "GET", "/cache/api/greeting", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app, "GET", "/cache/translation/greeting", None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

// == DELETE ==

#[tokio::test]
async fn test_delete_then_get() {
    let app = create_test_app();

    send(&app, "PUT", "/cache/api", Some(r#"{"key":"gone","value":true}"#)).await;

    let response = send(&app, "DELETE", "/cache/api/gone", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["deleted"], true);

    let response = send(&app, "GET", "/cache/api/gone", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_absent_key_is_ok() {
    let app = create_test_app();

    let response = send(&app, "DELETE", "/cache/api/never-set", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["deleted"], false);
}

// == Invalidate / Clear ==

#[tokio::test]
async fn test_invalidate_tag() {
    let app = create_test_app();

    for body in [
        r#"{"key":"p1","value":1,"tags":["products","featured"]}"#,
        r#"{"key":"p2","value":2,"tags":["products"]}"#,
        r#"{"key":"a1","value":3,"tags":["articles"]}"#,
    ] {
        send(&app, "PUT", "/cache/api", Some(body)).await;
    }

    let response = send(&app, "POST", "/cache/api/invalidate/products", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["removed"], 2);

    assert_eq!(
        send(&app, "GET", "/cache/api/p1", None).await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        send(&app, "GET", "/cache/api/a1", None).await.status(),
        StatusCode::OK
    );

    // p1 was also under "featured"; the index forgot it with the entry
    let response = send(&app, "POST", "/cache/api/invalidate/featured", None).await;
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["removed"], 0);
}

#[tokio::test]
async fn test_clear_cache() {
    let app = create_test_app();

    send(&app, "PUT", "/cache/api", Some(r#"{"key":"a","value":1}"#)).await;
    send(&app, "PUT", "/cache/api", Some(r#"{"key":"b","value":2}"#)).await;

    let response = send(&app, "DELETE", "/cache/api", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, "GET", "/stats", None).await;
    let json = body_to_json(response.into_body()).await;
    let api = json["caches"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["name"] == "api")
        .unwrap();
    assert_eq!(api["total_entries"], 0);
}

// == Content ==

#[tokio::test]
async fn test_content_rendered_once() {
    let app = create_test_app();

    let first = send(&app, "GET", "/content/summer-menu", None).await;
    let first = body_to_json(first.into_body()).await;
    let second = send(&app, "GET", "/content/summer-menu", None).await;
    let second = body_to_json(second.into_body()).await;

    assert_eq!(first["title"], "Summer Menu");
    assert_eq!(first["rendered_at"], second["rendered_at"]);
}

#[tokio::test]
async fn test_content_invalid_slug() {
    let app = create_test_app();

    let response = send(&app, "GET", "/content/Not_Valid", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_content_invalidated_by_tag() {
    let app = create_test_app();

    send(&app, "GET", "/content/news", None).await;

    let response = send(&app, "POST", "/cache/content/invalidate/content", None).await;
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["removed"], 1);
}

// == STATS / HEALTH ==

#[tokio::test]
async fn test_stats_endpoint() {
    let app = create_test_app();

    send(&app, "PUT", "/cache/api", Some(r#"{"key":"s","value":"v"}"#)).await;
    send(&app, "GET", "/cache/api/s", None).await;
    send(&app, "GET", "/cache/api/missing", None).await;

    let response = send(&app, "GET", "/stats", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;

    let api = json["caches"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["name"] == "api")
        .unwrap()
        .clone();
    assert_eq!(api["hits"], 1);
    assert_eq!(api["misses"], 1);
    assert_eq!(api["total_entries"], 1);
    assert!((api["hit_rate"].as_f64().unwrap() - 0.5).abs() < 0.001);
    assert_eq!(json["rate_limiter"]["max_requests"], 100);
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app();

    let response = send(&app, "GET", "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "healthy");
    assert!(json.get("timestamp").is_some());
}

// == Error Responses ==

#[tokio::test]
async fn test_invalid_json_request() {
    let app = create_test_app();

    let response = send(&app, "PUT", "/cache/api", Some(r#"{"invalid json"#)).await;

    // Axum rejects malformed JSON before the handler runs
    assert!(
        response.status() == StatusCode::BAD_REQUEST
            || response.status() == StatusCode::UNPROCESSABLE_ENTITY
    );
}

#[tokio::test]
async fn test_empty_key_request() {
    let app = create_test_app();

    let response = send(&app, "PUT", "/cache/api", Some(r#"{"key":"","value":"test"}"#)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert!(json.get("error").is_some());
}

// == TTL Expiration ==

#[tokio::test]
async fn test_ttl_expiration_via_api() {
    let app = create_test_app();

    let response = send(
        &app,
        "PUT",
        "/cache/api",
        Some(r#"{"key":"ttl_test","value":"expires_soon","ttl_ms":50}"#),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(
        send(&app, "GET", "/cache/api/ttl_test", None).await.status(),
        StatusCode::OK
    );

    tokio::time::sleep(Duration::from_millis(120)).await;

    assert_eq!(
        send(&app, "GET", "/cache/api/ttl_test", None).await.status(),
        StatusCode::NOT_FOUND
    );
}

// == Rate Limiting ==

#[tokio::test]
async fn test_rate_limit_rejects_over_budget() {
    let app = create_limited_app(2);

    for remaining in ["1", "0"] {
        let response = send(&app, "GET", "/health", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-limit"], "2");
        assert_eq!(response.headers()["x-ratelimit-remaining"], remaining);
    }

    let response = send(&app, "GET", "/health", None).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response.headers()[header::RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));
    let json = body_to_json(response.into_body()).await;
    assert!(json["error"].as_str().unwrap().contains("Too many requests"));
}

#[tokio::test]
async fn test_rate_limit_per_client() {
    let app = create_limited_app(1);

    let request = |ip: &'static str| {
        Request::builder()
            .method("GET")
            .uri("/health")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    };

    let first = app.clone().oneshot(request("203.0.113.1")).await.unwrap();
    let second = app.clone().oneshot(request("203.0.113.2")).await.unwrap();
    let repeat = app.clone().oneshot(request("203.0.113.1")).await.unwrap();

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(repeat.status(), StatusCode::TOO_MANY_REQUESTS);
}
