use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::middleware::require_auth;
use crate::state::AppState;

use super::controller::{
    forgot_password, get_csrf_token, login, logout, refresh_tokens, register, reset_password,
    send_verification_email, verify_email,
};

pub fn init_auth_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/send-verification-email",
            post(send_verification_email)
                .route_layer(middleware::from_fn_with_state(state, require_auth)),
        )
        .route("/csrf", get(get_csrf_token))
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/refresh-tokens", post(refresh_tokens))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
        .route("/verify-email", post(verify_email))
}
