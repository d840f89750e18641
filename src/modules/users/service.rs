use anyhow::anyhow;
use keystone_auth::TokenKind;
use keystone_core::{AppError, Paginated, hash_password};
use keystone_models::users::{CreateUserRequest, UpdateUserRequest};
use keystone_models::{NewUser, User, UserQuery};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::modules::auth::service::normalize_email;
use crate::state::AppState;

fn email_taken() -> AppError {
    AppError::bad_request(anyhow!("Email already taken"))
}

fn user_not_found() -> AppError {
    AppError::not_found(anyhow!("User not found"))
}

pub struct UserService;

impl UserService {
    #[instrument(skip(state))]
    pub async fn list_users(state: &AppState, query: UserQuery) -> Result<Paginated<User>, AppError> {
        let (users, total) = state.users.search(&query).await?;
        Ok(Paginated::new(users, query.page, total))
    }

    #[instrument(skip(state, dto), fields(email = %dto.email, role = %dto.role))]
    pub async fn create_user(state: &AppState, dto: CreateUserRequest) -> Result<User, AppError> {
        let email = normalize_email(&dto.email);
        if state.users.exists_by_email(&email, None).await? {
            return Err(email_taken());
        }

        let user = state
            .users
            .create(NewUser {
                name: dto.name.trim().to_string(),
                email,
                password_hash: hash_password(&dto.password)?,
                role: dto.role,
                is_email_verified: false,
            })
            .await?;

        info!(user.id = %user.id, "User created");
        Ok(user)
    }

    pub async fn get_user(state: &AppState, id: Uuid) -> Result<User, AppError> {
        state.users.find_by_id(id).await?.ok_or_else(user_not_found)
    }

    /// Applies the non-empty fields of `dto`. A password change signs the
    /// user out everywhere.
    #[instrument(skip(state, dto))]
    pub async fn update_user(
        state: &AppState,
        id: Uuid,
        dto: UpdateUserRequest,
    ) -> Result<User, AppError> {
        let mut user = Self::get_user(state, id).await?;

        if let Some(name) = dto.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            user.name = name.to_string();
        }

        if let Some(email) = dto.email.as_deref().map(normalize_email).filter(|e| !e.is_empty()) {
            if email != user.email && state.users.exists_by_email(&email, Some(id)).await? {
                return Err(email_taken());
            }
            user.email = email;
        }

        let password_changed = match dto.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => {
                user.password = hash_password(password)?;
                true
            }
            None => false,
        };

        let user = state.users.update(&user).await?.ok_or_else(user_not_found)?;

        if password_changed {
            state
                .tokens
                .invalidate_all_of_kind(id, TokenKind::Refresh)
                .await
                .map_err(AppError::internal)?;
        }

        Ok(user)
    }

    /// Deletes the user together with every persisted token it holds.
    #[instrument(skip(state))]
    pub async fn delete_user(state: &AppState, id: Uuid) -> Result<(), AppError> {
        if !state.users.delete(id).await? {
            return Err(user_not_found());
        }

        for kind in [TokenKind::Refresh, TokenKind::ResetPassword, TokenKind::VerifyEmail] {
            state
                .tokens
                .invalidate_all_of_kind(id, kind)
                .await
                .map_err(AppError::internal)?;
        }

        info!(user.id = %id, "User deleted");
        Ok(())
    }
}
