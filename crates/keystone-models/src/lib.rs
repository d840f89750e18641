//! # Keystone Models
//!
//! Domain records and request/response DTOs.
//!
//! - [`users`]: [`User`], [`Role`], list query parsing
//! - [`tokens`]: persisted token records
//! - [`auth`]: authentication payloads and the token pair shape

pub mod auth;
pub mod tokens;
pub mod users;

pub use auth::{AuthResponse, AuthTokens, TokenGrant};
pub use tokens::{NewTokenRecord, TokenRecord};
pub use users::{NewUser, Role, User, UserQuery};
