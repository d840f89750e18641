use anyhow::anyhow;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, StatusCode, header, request::Parts},
    middleware::Next,
    response::Response,
};
use keystone_auth::Claims;
use keystone_core::AppError;
use tracing::debug;
use uuid::Uuid;

use crate::modules::tokens::{TokenService, token_rejection};
use crate::state::AppState;

const UNAUTHENTICATED: &str = "Please authenticate";

/// The verified subject of a bearer access token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub subject_id: Uuid,
    pub claims: Claims,
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Signature, expiry and kind check of the bearer header. No storage access.
pub fn authenticate(headers: &HeaderMap, tokens: &TokenService) -> Result<AuthUser, AppError> {
    let token = bearer_token(headers)
        .ok_or_else(|| AppError::unauthorized(anyhow!(UNAUTHENTICATED)))?;

    let claims = tokens.verify_access(token).map_err(|err| {
        debug!(error = %err, "Bearer token rejected");
        token_rejection(err, StatusCode::UNAUTHORIZED, UNAUTHENTICATED)
    })?;

    let subject_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::unauthorized(anyhow!(UNAUTHENTICATED)))?;

    Ok(AuthUser { subject_id, claims })
}

/// Rejects the request with 401 unless it carries a valid access token, and
/// makes the [`AuthUser`] available to later layers and handlers.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = authenticate(req.headers(), &state.tokens)?;
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        authenticate(&parts.headers, &state.tokens)
    }
}
