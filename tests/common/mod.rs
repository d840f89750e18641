#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use http_body_util::BodyExt;
use keystone::router::init_router;
use keystone::state::{AppState, Settings};
use keystone::utils::email::Mailer;
use keystone_core::hash_password;
use keystone_models::{NewUser, Role, User};
use serde_json::Value;
use tower::ServiceExt;

pub const SECRET: &str = "integration-test-secret-0123456789abcdef";
pub const PASSWORD: &str = "password1";

#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl SentEmail {
    /// The `token` query parameter of the link in the body.
    pub fn token(&self) -> String {
        let start = self.body.find("token=").expect("link with token") + "token=".len();
        self.body[start..]
            .split_whitespace()
            .next()
            .unwrap()
            .to_string()
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentEmail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last(&self) -> SentEmail {
        self.sent().last().cloned().expect("an email was sent")
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(SentEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// A `csrf_session` cookie and the token paired with it.
#[derive(Debug, Clone)]
pub struct CsrfPair {
    pub cookie: String,
    pub token: String,
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub mailer: Arc<RecordingMailer>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_settings(Settings::in_memory(SECRET))
    }

    pub fn with_settings(settings: Settings) -> Self {
        let mailer = Arc::new(RecordingMailer::default());
        let state = AppState::in_memory(settings, mailer.clone()).unwrap();
        Self {
            router: init_router(state.clone()),
            state,
            mailer,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Opens a browser session through `GET /v1/auth/csrf`.
    pub async fn csrf(&self) -> CsrfPair {
        let response = self.send(get("/v1/auth/csrf").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let cookie = session_cookie(&response).expect("csrf_session cookie");
        let body = body_json(response).await;
        CsrfPair {
            cookie,
            token: body["csrfToken"].as_str().unwrap().to_string(),
        }
    }

    /// POSTs JSON from a browser session.
    pub async fn post_json(&self, csrf: &CsrfPair, uri: &str, body: Value) -> Response<Body> {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::COOKIE, &csrf.cookie)
            .header("x-csrf-token", &csrf.token)
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn create_user(&self, email: &str, role: Role) -> User {
        self.state
            .users
            .create(NewUser {
                name: "Test User".to_string(),
                email: email.to_string(),
                password_hash: hash_password(PASSWORD).unwrap(),
                role,
                is_email_verified: false,
            })
            .await
            .unwrap()
    }

    /// A user of `role` with a fresh access token.
    pub async fn user_with_token(&self, email: &str, role: Role) -> (User, String) {
        let user = self.create_user(email, role).await;
        let tokens = self.state.tokens.issue_auth_token_pair(user.id).await.unwrap();
        (user, tokens.access.token)
    }
}

pub fn get(uri: &str) -> axum::http::request::Builder {
    Request::builder().method("GET").uri(uri)
}

/// An API-client request: bearer token, no cookie.
pub fn bearer(method: &str, uri: &str, token: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
}

/// `name=value` of the `csrf_session` Set-Cookie header, if any.
pub fn session_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("csrf_session="))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap()
}
