use axum::http::{HeaderName, HeaderValue, Method, StatusCode, header};
use axum::{Json, Router, middleware, routing::get};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use utoipa::OpenApi;

use crate::docs::ApiDoc;
use crate::logging::logging_middleware;
use crate::middleware::{csrf_middleware, rate_limit_middleware, security_headers_middleware};
use crate::modules::auth::init_auth_router;
use crate::modules::users::init_users_router;
use crate::security::csrf::HEADER_NAME;
use crate::state::AppState;

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let allowed_origins: Vec<HeaderValue> = state
        .cors_config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(HEADER_NAME),
        ])
        .allow_credentials(true)
}

/// Builds the application. Layers run outermost first: timeout, request
/// logging, CORS, security headers, CSRF, rate limit, then the per-route
/// auth and role checks.
pub fn init_router(state: AppState) -> Router {
    let timeout = state.request_timeout();

    Router::new()
        .route("/health", get(health))
        .route("/api-docs/openapi.json", get(openapi))
        .nest(
            "/v1",
            Router::new()
                .nest("/auth", init_auth_router(state.clone()))
                .nest("/users", init_users_router(state.clone())),
        )
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(state.clone(), csrf_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            security_headers_middleware,
        ))
        .layer(cors_layer(&state))
        .layer(middleware::from_fn_with_state(state, logging_middleware))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeout,
        ))
}
