//! # Keystone API
//!
//! Starter-kit user backend built on Axum: registration and login with
//! JWT access/refresh pairs, password reset and email verification, and
//! admin user management.
//!
//! ## Admission control
//!
//! Every request passes the same ordered chain before reaching a handler:
//!
//! ```text
//! timeout → request log → CORS → security headers → CSRF → rate limit
//!     → require_auth (bearer) → require_admin / require_admin_or_self → handler
//! ```
//!
//! - **CSRF**: double-submit token bound to a `csrf_session` cookie,
//!   checked on POST, PUT, PATCH and DELETE
//! - **Rate limit**: token bucket per client IP, on by default in production
//! - **Tokens**: access tokens are stateless; refresh, reset-password and
//!   verify-email tokens must also exist in the token store
//!
//! ## Layout
//!
//! ```text
//! src/
//! ├── middleware/   # axum layers and extractors
//! ├── modules/      # auth, tokens, users (controller/service/router)
//! ├── security/     # CSRF sessions, rate limiter, client identification
//! └── utils/        # email dispatch
//! ```
//!
//! Configuration, token encoding, models and pagination live in the
//! `keystone-*` workspace crates.

pub mod docs;
pub mod logging;
pub mod middleware;
pub mod modules;
pub mod router;
pub mod security;
pub mod state;
pub mod tasks;
pub mod utils;
pub mod validator;

pub use keystone_auth;
pub use keystone_config;
pub use keystone_core;
pub use keystone_db;
pub use keystone_models;
