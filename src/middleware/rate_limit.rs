use anyhow::anyhow;
use axum::{
    extract::{Request, State},
    http::{HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use keystone_core::AppError;
use tracing::warn;

use crate::security::client_key;
use crate::state::AppState;

/// Spends one token from the client's bucket, or answers 429. A no-op when
/// rate limiting is disabled.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(limiter) = state.rate_limiter.as_ref() else {
        return next.run(req).await;
    };

    let key = client_key(
        req.headers(),
        req.extensions(),
        state.rate_limit_config.trust_forwarded_for,
    );

    if limiter.allow(&key) {
        return next.run(req).await;
    }

    warn!(client = %key, path = %req.uri().path(), "Rate limit exceeded");
    let mut response =
        AppError::too_many_requests(anyhow!("Too many requests, please try again later"))
            .into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
    response
}
