use keystone_core::ErrorBody;
use keystone_models::auth::{
    CsrfTokenResponse, ForgotPasswordRequest, LoginRequest, RefreshTokenRequest, RegisterRequest,
    ResetPasswordRequest,
};
use keystone_models::users::{CreateUserRequest, UpdateUserRequest};
use keystone_models::{AuthResponse, AuthTokens, Role, TokenGrant, User};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::auth::controller::get_csrf_token,
        crate::modules::auth::controller::register,
        crate::modules::auth::controller::login,
        crate::modules::auth::controller::logout,
        crate::modules::auth::controller::refresh_tokens,
        crate::modules::auth::controller::forgot_password,
        crate::modules::auth::controller::reset_password,
        crate::modules::auth::controller::send_verification_email,
        crate::modules::auth::controller::verify_email,
        crate::modules::users::controller::list_users,
        crate::modules::users::controller::create_user,
        crate::modules::users::controller::get_user,
        crate::modules::users::controller::update_user,
        crate::modules::users::controller::delete_user,
    ),
    components(
        schemas(
            User,
            Role,
            CreateUserRequest,
            UpdateUserRequest,
            RegisterRequest,
            LoginRequest,
            RefreshTokenRequest,
            ForgotPasswordRequest,
            ResetPasswordRequest,
            TokenGrant,
            AuthTokens,
            AuthResponse,
            CsrfTokenResponse,
            ErrorBody,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Registration, login and token flows"),
        (name = "Users", description = "User management, admin only unless reading yourself")
    ),
    info(
        title = "Keystone API",
        version = "0.1.0",
        description = "User backend with JWT authentication, CSRF protection and rate limiting.",
        license(
            name = "MIT"
        )
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            )
        }
    }
}
