//! Role checks layered after [`require_auth`](crate::middleware::auth::require_auth).
//!
//! The role is read from the user repository on every request, so a
//! demotion takes effect immediately rather than when the access token
//! expires.
//!
//! ```rust,ignore
//! Router::new()
//!     .route("/", get(list_users))
//!     .route_layer(middleware::from_fn_with_state(state.clone(), require_admin))
//!     .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));
//! ```

use std::collections::HashMap;

use anyhow::anyhow;
use axum::{
    extract::{Path, Request, State},
    middleware::Next,
    response::Response,
};
use keystone_core::AppError;
use tracing::warn;
use uuid::Uuid;

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

async fn ensure_admin(state: &AppState, subject_id: Uuid) -> Result<(), AppError> {
    let user = state
        .users
        .find_by_id(subject_id)
        .await?
        .ok_or_else(|| AppError::unauthorized(anyhow!("Please authenticate")))?;

    if !user.is_admin() {
        warn!(user.id = %subject_id, role = %user.role, "Admin route refused");
        return Err(AppError::forbidden(anyhow!("Forbidden")));
    }

    Ok(())
}

pub async fn require_admin(
    State(state): State<AppState>,
    auth: AuthUser,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    ensure_admin(&state, auth.subject_id).await?;
    Ok(next.run(req).await)
}

/// Lets a subject through to its own resource (the `{id}` path segment);
/// anyone else must be an admin.
pub async fn require_admin_or_self(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(params): Path<HashMap<String, String>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let is_self = params
        .get("id")
        .and_then(|id| Uuid::parse_str(id).ok())
        .is_some_and(|id| id == auth.subject_id);

    if !is_self {
        ensure_admin(&state, auth.subject_id).await?;
    }

    Ok(next.run(req).await)
}
