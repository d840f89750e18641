mod common;

use axum::body::Body;
use axum::http::StatusCode;
use common::{PASSWORD, TestApp, bearer, body_json};
use keystone_models::Role;
use serde_json::json;

#[tokio::test]
async fn test_register_returns_user_and_tokens() {
    let app = TestApp::new();
    let csrf = app.csrf().await;

    let response = app
        .post_json(
            &csrf,
            "/v1/auth/register",
            json!({ "name": "Ada", "email": "ada@example.com", "password": PASSWORD }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert_eq!(body["user"]["email"], "ada@example.com");
    assert_eq!(body["user"]["role"], "user");
    assert!(body["user"].get("password").is_none());
    assert!(body["tokens"]["access"]["token"].is_string());
    assert!(body["tokens"]["refresh"]["expires"].is_string());
}

#[tokio::test]
async fn test_register_duplicate_email() {
    let app = TestApp::new();
    app.create_user("ada@example.com", Role::User).await;
    let csrf = app.csrf().await;

    let response = app
        .post_json(
            &csrf,
            "/v1/auth/register",
            json!({ "name": "Ada", "email": "ada@example.com", "password": PASSWORD }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["message"], "Email already taken");
}

#[tokio::test]
async fn test_register_validation_error() {
    let app = TestApp::new();
    let csrf = app.csrf().await;

    let response = app
        .post_json(
            &csrf,
            "/v1/auth/register",
            json!({ "name": "Ada", "email": "ada@example.com", "password": "short" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_login_wrong_password() {
    let app = TestApp::new();
    app.create_user("ada@example.com", Role::User).await;
    let csrf = app.csrf().await;

    let response = app
        .post_json(
            &csrf,
            "/v1/auth/login",
            json!({ "email": "ada@example.com", "password": "not-the-password" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = body_json(response).await;
    assert_eq!(body["code"], 401);
    assert_eq!(body["message"], "Incorrect email or password");
}

#[tokio::test]
async fn test_register_refresh_then_old_refresh_fails() {
    let app = TestApp::new();
    let csrf = app.csrf().await;

    let registered = body_json(
        app.post_json(
            &csrf,
            "/v1/auth/register",
            json!({ "name": "Ada", "email": "ada@example.com", "password": PASSWORD }),
        )
        .await,
    )
    .await;
    let old_refresh = registered["tokens"]["refresh"]["token"].as_str().unwrap().to_string();

    let response = app
        .post_json(
            &csrf,
            "/v1/auth/refresh-tokens",
            json!({ "refreshToken": old_refresh }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let rotated = body_json(response).await;
    assert_ne!(rotated["refresh"]["token"], old_refresh.as_str());

    let response = app
        .post_json(
            &csrf,
            "/v1/auth/refresh-tokens",
            json!({ "refreshToken": old_refresh }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["message"], "Invalid or expired token");
}

#[tokio::test]
async fn test_access_token_is_not_a_refresh_token() {
    let app = TestApp::new();
    let (_, access) = app.user_with_token("ada@example.com", Role::User).await;
    let csrf = app.csrf().await;

    let response = app
        .post_json(&csrf, "/v1/auth/refresh-tokens", json!({ "refreshToken": access }))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout() {
    let app = TestApp::new();
    let user = app.create_user("ada@example.com", Role::User).await;
    let tokens = app.state.tokens.issue_auth_token_pair(user.id).await.unwrap();
    let csrf = app.csrf().await;

    let response = app
        .post_json(&csrf, "/v1/auth/logout", json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["message"], "refreshToken is required");

    let body = json!({ "refreshToken": tokens.refresh.token });
    let response = app.post_json(&csrf, "/v1/auth/logout", body.clone()).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.post_json(&csrf, "/v1/auth/logout", body).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_forgot_and_reset_password() {
    let app = TestApp::new();
    let user = app.create_user("ada@example.com", Role::User).await;
    let session = app.state.tokens.issue_auth_token_pair(user.id).await.unwrap();
    let csrf = app.csrf().await;

    let response = app
        .post_json(&csrf, "/v1/auth/forgot-password", json!({ "email": "ada@example.com" }))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let email = app.mailer.last();
    assert_eq!(email.to, "ada@example.com");
    assert_eq!(email.subject, "Reset password");
    let token = email.token();

    let uri = format!("/v1/auth/reset-password?token={token}");
    let response = app
        .post_json(&csrf, &uri, json!({ "password": "brand-new-password" }))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .post_json(&csrf, &uri, json!({ "password": "another-password" }))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["message"], "Password reset failed");

    let response = app
        .post_json(
            &csrf,
            "/v1/auth/refresh-tokens",
            json!({ "refreshToken": session.refresh.token }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .post_json(
            &csrf,
            "/v1/auth/login",
            json!({ "email": "ada@example.com", "password": "brand-new-password" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_forgot_password_unknown_email() {
    let app = TestApp::new();
    let csrf = app.csrf().await;

    let response = app
        .post_json(&csrf, "/v1/auth/forgot-password", json!({ "email": "nobody@example.com" }))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(app.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_reset_password_requires_token() {
    let app = TestApp::new();
    let csrf = app.csrf().await;

    let response = app
        .post_json(&csrf, "/v1/auth/reset-password", json!({ "password": "brand-new-password" }))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_send_and_verify_email() {
    let app = TestApp::new();
    let (user, access) = app.user_with_token("ada@example.com", Role::User).await;

    let response = app
        .send(
            bearer("POST", "/v1/auth/send-verification-email", &access)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let email = app.mailer.last();
    assert_eq!(email.subject, "Email Verification");
    let token = email.token();

    let csrf = app.csrf().await;
    let uri = format!("/v1/auth/verify-email?token={token}");
    let response = app.post_json(&csrf, &uri, json!({})).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let stored = app.state.users.find_by_id(user.id).await.unwrap().unwrap();
    assert!(stored.is_email_verified);

    let response = app.post_json(&csrf, &uri, json!({})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["message"], "Email verification failed");
}

#[tokio::test]
async fn test_send_verification_email_requires_bearer() {
    let app = TestApp::new();
    let csrf = app.csrf().await;

    let response = app
        .post_json(&csrf, "/v1/auth/send-verification-email", json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["message"], "Please authenticate");
}

#[tokio::test]
async fn test_health_and_openapi() {
    let app = TestApp::new();

    let response = app.send(common::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");

    let response = app
        .send(common::get("/api-docs/openapi.json").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await["paths"]["/v1/auth/login"].is_object());
}
