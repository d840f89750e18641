use anyhow::anyhow;
use axum::http::StatusCode;
use keystone_auth::TokenKind;
use keystone_core::{AppError, hash_password};
use keystone_models::auth::{LoginRequest, RegisterRequest};
use keystone_models::{AuthResponse, AuthTokens, NewUser, Role, User};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::modules::tokens::token_rejection;
use crate::state::AppState;

const INVALID_TOKEN: &str = "Invalid or expired token";
const RESET_FAILED: &str = "Password reset failed";
const VERIFY_FAILED: &str = "Email verification failed";

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub struct AuthService;

impl AuthService {
    #[instrument(skip(state, dto), fields(email = %dto.email))]
    pub async fn register(state: &AppState, dto: RegisterRequest) -> Result<AuthResponse, AppError> {
        let email = normalize_email(&dto.email);

        if state.users.exists_by_email(&email, None).await? {
            return Err(AppError::bad_request(anyhow!("Email already taken")));
        }

        let user = state
            .users
            .create(NewUser {
                name: dto.name.trim().to_string(),
                email,
                password_hash: hash_password(&dto.password)?,
                role: Role::User,
                is_email_verified: false,
            })
            .await?;

        let tokens = Self::issue_tokens(state, user.id).await?;
        info!(user.id = %user.id, "User registered");

        Ok(AuthResponse { user, tokens })
    }

    #[instrument(skip(state, dto), fields(email = %dto.email))]
    pub async fn login(state: &AppState, dto: LoginRequest) -> Result<AuthResponse, AppError> {
        let invalid = || AppError::unauthorized(anyhow!("Incorrect email or password"));

        let user = state
            .users
            .find_by_email(&normalize_email(&dto.email))
            .await?
            .ok_or_else(invalid)?;

        if !user.verify_password(&dto.password)? {
            warn!(user.id = %user.id, "Login with wrong password");
            return Err(invalid());
        }

        let tokens = Self::issue_tokens(state, user.id).await?;
        Ok(AuthResponse { user, tokens })
    }

    pub async fn logout(state: &AppState, refresh_token: &str) -> Result<(), AppError> {
        state
            .tokens
            .revoke_refresh(refresh_token)
            .await
            .map_err(|e| token_rejection(e, StatusCode::UNAUTHORIZED, INVALID_TOKEN))
    }

    pub async fn refresh_tokens(state: &AppState, refresh_token: &str) -> Result<AuthTokens, AppError> {
        state
            .tokens
            .rotate_refresh(refresh_token)
            .await
            .map_err(|e| token_rejection(e, StatusCode::UNAUTHORIZED, INVALID_TOKEN))
    }

    /// Succeeds whether or not the address belongs to an account. Mail
    /// failures are logged and swallowed for the same reason.
    #[instrument(skip_all)]
    pub async fn forgot_password(state: &AppState, email: &str) -> Result<(), AppError> {
        let Some(user) = state.users.find_by_email(&normalize_email(email)).await? else {
            info!("Password reset requested for unknown email");
            return Ok(());
        };

        let tokens = &state.tokens;
        let grant = tokens
            .issue_single_use_token(user.id, TokenKind::ResetPassword, tokens.ttl_for(TokenKind::ResetPassword))
            .await
            .map_err(AppError::internal)?;

        if let Err(e) = state.email.send_reset_password_email(&user.email, &grant.token).await {
            warn!(user.id = %user.id, error = %e, "Failed to send reset password email");
        }

        Ok(())
    }

    /// Redeems the reset token, sets the new password, then burns every other
    /// reset and refresh token the subject holds.
    #[instrument(skip_all)]
    pub async fn reset_password(
        state: &AppState,
        token: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        let record = state
            .tokens
            .consume(token, TokenKind::ResetPassword)
            .await
            .map_err(|e| token_rejection(e, StatusCode::BAD_REQUEST, RESET_FAILED))?;

        let mut user = Self::find_subject(state, record.subject_id, RESET_FAILED).await?;
        user.password = hash_password(new_password)?;
        state
            .users
            .update(&user)
            .await?
            .ok_or_else(|| AppError::bad_request(anyhow!(RESET_FAILED)))?;

        for kind in [TokenKind::ResetPassword, TokenKind::Refresh] {
            state
                .tokens
                .invalidate_all_of_kind(user.id, kind)
                .await
                .map_err(AppError::internal)?;
        }

        info!(user.id = %user.id, "Password reset");
        Ok(())
    }

    #[instrument(skip(state))]
    pub async fn send_verification_email(state: &AppState, subject_id: Uuid) -> Result<(), AppError> {
        let user = state
            .users
            .find_by_id(subject_id)
            .await?
            .ok_or_else(|| AppError::unauthorized(anyhow!("Please authenticate")))?;

        let tokens = &state.tokens;
        let grant = tokens
            .issue_single_use_token(user.id, TokenKind::VerifyEmail, tokens.ttl_for(TokenKind::VerifyEmail))
            .await
            .map_err(AppError::internal)?;

        state
            .email
            .send_verification_email(&user.email, &grant.token)
            .await
            .map_err(AppError::internal)?;

        Ok(())
    }

    #[instrument(skip_all)]
    pub async fn verify_email(state: &AppState, token: &str) -> Result<(), AppError> {
        let record = state
            .tokens
            .consume(token, TokenKind::VerifyEmail)
            .await
            .map_err(|e| token_rejection(e, StatusCode::BAD_REQUEST, VERIFY_FAILED))?;

        let mut user = Self::find_subject(state, record.subject_id, VERIFY_FAILED).await?;
        user.is_email_verified = true;
        state
            .users
            .update(&user)
            .await?
            .ok_or_else(|| AppError::bad_request(anyhow!(VERIFY_FAILED)))?;

        state
            .tokens
            .invalidate_all_of_kind(user.id, TokenKind::VerifyEmail)
            .await
            .map_err(AppError::internal)?;

        info!(user.id = %user.id, "Email verified");
        Ok(())
    }

    async fn issue_tokens(state: &AppState, subject_id: Uuid) -> Result<AuthTokens, AppError> {
        state
            .tokens
            .issue_auth_token_pair(subject_id)
            .await
            .map_err(AppError::internal)
    }

    async fn find_subject(
        state: &AppState,
        subject_id: Uuid,
        message: &'static str,
    ) -> Result<User, AppError> {
        state
            .users
            .find_by_id(subject_id)
            .await?
            .ok_or_else(|| AppError::bad_request(anyhow!(message)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::state::Settings;
    use crate::utils::email::LogMailer;

    fn state() -> AppState {
        AppState::in_memory(Settings::in_memory("auth-service-test-secret"), Arc::new(LogMailer))
            .unwrap()
    }

    fn register_request(email: &str) -> RegisterRequest {
        RegisterRequest {
            name: "Ada".to_string(),
            email: email.to_string(),
            password: "password1".to_string(),
        }
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Ada@Example.COM "), "ada@example.com");
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let state = state();
        let registered = AuthService::register(&state, register_request("Ada@Example.com"))
            .await
            .unwrap();
        assert_eq!(registered.user.email, "ada@example.com");
        assert_eq!(registered.user.role, Role::User);

        let logged_in = AuthService::login(
            &state,
            LoginRequest {
                email: "ada@example.com".to_string(),
                password: "password1".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(logged_in.user.id, registered.user.id);
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let state = state();
        AuthService::register(&state, register_request("ada@example.com"))
            .await
            .unwrap();

        let err = AuthService::register(&state, register_request("ADA@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.public_message(), "Email already taken");
    }

    #[tokio::test]
    async fn test_login_failures_share_message() {
        let state = state();
        AuthService::register(&state, register_request("ada@example.com"))
            .await
            .unwrap();

        for (email, password) in [("ada@example.com", "wrong-password"), ("bob@example.com", "password1")] {
            let err = AuthService::login(
                &state,
                LoginRequest {
                    email: email.to_string(),
                    password: password.to_string(),
                },
            )
            .await
            .unwrap_err();
            assert_eq!(err.status, StatusCode::UNAUTHORIZED);
            assert_eq!(err.public_message(), "Incorrect email or password");
        }
    }

    #[tokio::test]
    async fn test_logout_twice_is_rejected() {
        let state = state();
        let registered = AuthService::register(&state, register_request("ada@example.com"))
            .await
            .unwrap();
        let refresh = registered.tokens.refresh.token;

        AuthService::logout(&state, &refresh).await.unwrap();
        let err = AuthService::logout(&state, &refresh).await.unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.public_message(), INVALID_TOKEN);
    }

    #[tokio::test]
    async fn test_reset_password_revokes_sessions() {
        let state = state();
        let registered = AuthService::register(&state, register_request("ada@example.com"))
            .await
            .unwrap();
        let user_id = registered.user.id;

        let grant = state
            .tokens
            .issue_single_use_token(
                user_id,
                TokenKind::ResetPassword,
                state.tokens.ttl_for(TokenKind::ResetPassword),
            )
            .await
            .unwrap();

        AuthService::reset_password(&state, &grant.token, "new-password")
            .await
            .unwrap();

        let user = state.users.find_by_id(user_id).await.unwrap().unwrap();
        assert!(user.verify_password("new-password").unwrap());

        let err = AuthService::refresh_tokens(&state, &registered.tokens.refresh.token)
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);

        let err = AuthService::reset_password(&state, &grant.token, "another-password")
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.public_message(), RESET_FAILED);
    }

    #[tokio::test]
    async fn test_verify_email_marks_user() {
        let state = state();
        let registered = AuthService::register(&state, register_request("ada@example.com"))
            .await
            .unwrap();
        let user_id = registered.user.id;

        let grant = state
            .tokens
            .issue_single_use_token(
                user_id,
                TokenKind::VerifyEmail,
                state.tokens.ttl_for(TokenKind::VerifyEmail),
            )
            .await
            .unwrap();

        AuthService::verify_email(&state, &grant.token).await.unwrap();
        let user = state.users.find_by_id(user_id).await.unwrap().unwrap();
        assert!(user.is_email_verified);

        let err = AuthService::verify_email(&state, &grant.token).await.unwrap_err();
        assert_eq!(err.public_message(), VERIFY_FAILED);
    }

    #[tokio::test]
    async fn test_access_token_cannot_reset_password() {
        let state = state();
        let registered = AuthService::register(&state, register_request("ada@example.com"))
            .await
            .unwrap();

        let err = AuthService::reset_password(&state, &registered.tokens.access.token, "new-password")
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_forgot_password_unknown_email_is_ok() {
        let state = state();
        AuthService::forgot_password(&state, "nobody@example.com")
            .await
            .unwrap();
    }
}
