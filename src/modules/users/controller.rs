use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use keystone_core::{AppError, ErrorBody, Paginated};
use keystone_models::User;
use keystone_models::users::{CreateUserRequest, ListUsersParams, UpdateUserRequest};
use tracing::instrument;
use uuid::Uuid;

use super::service::UserService;
use crate::state::AppState;
use crate::validator::ValidatedJson;

/// List users with search, role filter, sorting and pagination
#[utoipa::path(
    get,
    path = "/v1/users",
    params(ListUsersParams),
    responses(
        (status = 200, description = "One page of users", body = Paginated<User>),
        (status = 401, description = "Please authenticate", body = ErrorBody),
        (status = 403, description = "Forbidden", body = ErrorBody)
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    Query(params): Query<ListUsersParams>,
) -> Result<Json<Paginated<User>>, AppError> {
    let page = UserService::list_users(&state, params.into()).await?;
    Ok(Json(page))
}

/// Create a user with any role
#[utoipa::path(
    post,
    path = "/v1/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Email already taken", body = ErrorBody),
        (status = 401, description = "Please authenticate", body = ErrorBody),
        (status = 403, description = "Forbidden", body = ErrorBody),
        (status = 422, description = "Validation error", body = ErrorBody)
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
#[instrument(skip_all)]
pub async fn create_user(
    State(state): State<AppState>,
    ValidatedJson(dto): ValidatedJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let user = UserService::create_user(&state, dto).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Get a user by id. Users may read their own record.
#[utoipa::path(
    get,
    path = "/v1/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User found", body = User),
        (status = 403, description = "Forbidden", body = ErrorBody),
        (status = 404, description = "User not found", body = ErrorBody)
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, AppError> {
    let user = UserService::get_user(&state, id).await?;
    Ok(Json(user))
}

/// Update a user's name, email or password
#[utoipa::path(
    patch,
    path = "/v1/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 400, description = "Email already taken", body = ErrorBody),
        (status = 404, description = "User not found", body = ErrorBody)
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
#[instrument(skip(state, dto))]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(dto): ValidatedJson<UpdateUserRequest>,
) -> Result<Json<User>, AppError> {
    let user = UserService::update_user(&state, id, dto).await?;
    Ok(Json(user))
}

/// Delete a user and revoke its tokens
#[utoipa::path(
    delete,
    path = "/v1/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 404, description = "User not found", body = ErrorBody)
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    UserService::delete_user(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
