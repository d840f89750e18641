use anyhow::anyhow;
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use keystone_core::{AppError, ErrorBody};
use keystone_models::auth::{
    CsrfTokenResponse, ForgotPasswordRequest, LoginRequest, RefreshTokenRequest, RegisterRequest,
    ResetPasswordRequest, TokenQuery,
};
use keystone_models::{AuthResponse, AuthTokens};
use tracing::instrument;

use super::service::AuthService;
use crate::middleware::{AuthUser, CsrfToken};
use crate::state::AppState;
use crate::validator::ValidatedJson;

fn required_token(query: TokenQuery) -> Result<String, AppError> {
    query
        .token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::bad_request(anyhow!("token is required")))
}

/// Anti-forgery token bound to the caller's `csrf_session` cookie
#[utoipa::path(
    get,
    path = "/v1/auth/csrf",
    responses(
        (status = 200, description = "Token for the X-CSRF-TOKEN header", body = CsrfTokenResponse)
    ),
    tag = "Authentication"
)]
pub async fn get_csrf_token(CsrfToken(csrf_token): CsrfToken) -> Json<CsrfTokenResponse> {
    Json(CsrfTokenResponse { csrf_token })
}

/// Register a new user
#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = AuthResponse),
        (status = 400, description = "Email already taken or malformed body", body = ErrorBody),
        (status = 403, description = "Invalid CSRF token", body = ErrorBody),
        (status = 422, description = "Validation error", body = ErrorBody)
    ),
    tag = "Authentication"
)]
#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(dto): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let response = AuthService::register(&state, dto).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Log in with email and password
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Incorrect email or password", body = ErrorBody),
        (status = 403, description = "Invalid CSRF token", body = ErrorBody)
    ),
    tag = "Authentication"
)]
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(dto): ValidatedJson<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let response = AuthService::login(&state, dto).await?;
    Ok(Json(response))
}

/// Revoke a refresh token
#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    request_body = RefreshTokenRequest,
    responses(
        (status = 204, description = "Logged out"),
        (status = 400, description = "refreshToken is required", body = ErrorBody),
        (status = 401, description = "Invalid or expired token", body = ErrorBody)
    ),
    tag = "Authentication"
)]
#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    ValidatedJson(dto): ValidatedJson<RefreshTokenRequest>,
) -> Result<StatusCode, AppError> {
    AuthService::logout(&state, &dto.refresh_token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Exchange a refresh token for a new token pair
#[utoipa::path(
    post,
    path = "/v1/auth/refresh-tokens",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "New token pair", body = AuthTokens),
        (status = 401, description = "Invalid or expired token", body = ErrorBody)
    ),
    tag = "Authentication"
)]
#[instrument(skip_all)]
pub async fn refresh_tokens(
    State(state): State<AppState>,
    ValidatedJson(dto): ValidatedJson<RefreshTokenRequest>,
) -> Result<Json<AuthTokens>, AppError> {
    let tokens = AuthService::refresh_tokens(&state, &dto.refresh_token).await?;
    Ok(Json(tokens))
}

/// Email a password reset link if the account exists
#[utoipa::path(
    post,
    path = "/v1/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 204, description = "Reset link sent if the account exists")
    ),
    tag = "Authentication"
)]
#[instrument(skip_all)]
pub async fn forgot_password(
    State(state): State<AppState>,
    ValidatedJson(dto): ValidatedJson<ForgotPasswordRequest>,
) -> Result<StatusCode, AppError> {
    AuthService::forgot_password(&state, &dto.email).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Set a new password using a reset token
#[utoipa::path(
    post,
    path = "/v1/auth/reset-password",
    params(TokenQuery),
    request_body = ResetPasswordRequest,
    responses(
        (status = 204, description = "Password updated"),
        (status = 400, description = "Password reset failed", body = ErrorBody)
    ),
    tag = "Authentication"
)]
#[instrument(skip_all)]
pub async fn reset_password(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    ValidatedJson(dto): ValidatedJson<ResetPasswordRequest>,
) -> Result<StatusCode, AppError> {
    let token = required_token(query)?;
    AuthService::reset_password(&state, &token, &dto.password).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Email a verification link to the authenticated user
#[utoipa::path(
    post,
    path = "/v1/auth/send-verification-email",
    responses(
        (status = 204, description = "Verification email sent"),
        (status = 401, description = "Please authenticate", body = ErrorBody)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
#[instrument(skip_all, fields(user.id = %auth.subject_id))]
pub async fn send_verification_email(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<StatusCode, AppError> {
    AuthService::send_verification_email(&state, auth.subject_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Mark the email address of a verify-email token's subject as verified
#[utoipa::path(
    post,
    path = "/v1/auth/verify-email",
    params(TokenQuery),
    responses(
        (status = 204, description = "Email verified"),
        (status = 400, description = "Email verification failed", body = ErrorBody)
    ),
    tag = "Authentication"
)]
#[instrument(skip_all)]
pub async fn verify_email(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<StatusCode, AppError> {
    let token = required_token(query)?;
    AuthService::verify_email(&state, &token).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_token() {
        assert_eq!(
            required_token(TokenQuery {
                token: Some("abc".to_string())
            })
            .unwrap(),
            "abc"
        );

        for token in [None, Some(String::new()), Some("  ".to_string())] {
            let err = required_token(TokenQuery { token }).unwrap_err();
            assert_eq!(err.status, StatusCode::BAD_REQUEST);
        }
    }
}
