pub mod service;
pub mod store;

use anyhow::anyhow;
use axum::http::StatusCode;
use keystone_auth::TokenError;
use keystone_core::AppError;

pub use service::TokenService;
pub use store::{InMemoryTokenStore, PgTokenStore, TokenStore};

/// Maps a token failure to the response a client sees. Every rejection
/// cause collapses into `message`; store failures stay 500s.
pub fn token_rejection(err: TokenError, status: StatusCode, message: &'static str) -> AppError {
    if err.is_rejection() {
        AppError::new(status, anyhow!(message))
    } else {
        AppError::internal(err)
    }
}
