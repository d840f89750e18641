//! # Keystone Config
//!
//! Configuration loaded from environment variables at startup.
//!
//! - [`app`]: server identity, environment and listener settings
//! - [`database`]: storage driver and connection settings
//! - [`jwt`]: token secret and lifetimes
//! - [`rate_limit`]: per-client token bucket
//! - [`csrf`]: anti-forgery session behaviour
//! - [`cors`]: allowed origins
//! - [`email`]: SMTP settings
//!
//! Loaders return [`ConfigError`] for anything that would make the server
//! unsafe or unable to start; callers treat it as fatal.
//!
//! ```ignore
//! use keystone_config::{AppConfig, JwtConfig};
//!
//! let app = AppConfig::from_env()?;
//! let jwt = JwtConfig::from_env(app.environment)?;
//! ```

pub mod app;
pub mod cors;
pub mod csrf;
pub mod database;
pub mod email;
pub mod env;
pub mod error;
pub mod jwt;
pub mod rate_limit;

pub use app::{AppConfig, Environment};
pub use cors::CorsConfig;
pub use csrf::{CsrfConfig, SessionRecovery};
pub use database::{DatabaseConfig, DbDriver};
pub use email::EmailConfig;
pub use error::ConfigError;
pub use jwt::JwtConfig;
pub use rate_limit::RateLimitConfig;
