//! Admission control, applied in this order (outermost first):
//! security headers, CSRF, rate limit, then per-route bearer auth and role
//! checks.

pub mod auth;
pub mod csrf;
pub mod rate_limit;
pub mod role;
pub mod security_headers;

pub use auth::{AuthUser, require_auth};
pub use csrf::{CsrfToken, csrf_middleware};
pub use rate_limit::rate_limit_middleware;
pub use role::{require_admin, require_admin_or_self};
pub use security_headers::security_headers_middleware;
