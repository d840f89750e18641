mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use common::{TestApp, body_json, get};
use keystone::state::Settings;

fn limited_app(capacity: u32) -> TestApp {
    let mut settings = Settings::in_memory(common::SECRET);
    settings.rate_limit.enabled = true;
    settings.rate_limit.capacity = capacity;
    settings.rate_limit.refill_per_second = 1;
    settings.rate_limit.trust_forwarded_for = true;
    TestApp::with_settings(settings)
}

fn from_client(ip: &str) -> Request<Body> {
    get("/health")
        .header("x-forwarded-for", ip)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_burst_then_too_many_requests() {
    let app = limited_app(2);

    for _ in 0..2 {
        let response = app.send(from_client("203.0.113.7")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app.send(from_client("203.0.113.7")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()[header::RETRY_AFTER], "1");
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");

    let body = body_json(response).await;
    assert_eq!(body["code"], 429);
    assert_eq!(body["message"], "Too many requests, please try again later");
}

#[tokio::test]
async fn test_clients_have_separate_buckets() {
    let app = limited_app(1);

    assert_eq!(app.send(from_client("203.0.113.7")).await.status(), StatusCode::OK);
    assert_eq!(
        app.send(from_client("203.0.113.7")).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(app.send(from_client("198.51.100.1")).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_first_forwarded_hop_is_the_client() {
    let app = limited_app(1);

    let request = get("/health")
        .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.send(request).await.status(), StatusCode::OK);
    assert_eq!(
        app.send(from_client("203.0.113.7")).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
}

#[tokio::test]
async fn test_csrf_rejections_do_not_spend_tokens() {
    let app = limited_app(1);

    let forged = Request::builder()
        .method("POST")
        .uri("/v1/auth/logout")
        .header("x-forwarded-for", "203.0.113.7")
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.send(forged).await.status(), StatusCode::FORBIDDEN);

    assert_eq!(app.send(from_client("203.0.113.7")).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_disabled_by_default_outside_production() {
    let app = TestApp::new();
    assert!(app.state.rate_limiter.is_none());

    for _ in 0..50 {
        assert_eq!(app.send(from_client("203.0.113.7")).await.status(), StatusCode::OK);
    }
}
