//! # Keystone Auth
//!
//! Signed, time-bound credentials.
//!
//! - [`claims`]: [`Claims`] and [`TokenKind`]
//! - [`jwt`]: HS256 encode/decode with algorithm pinning
//! - [`error`]: [`TokenError`]
//!
//! This crate is pure: it never touches storage. Persistence and revocation
//! of refresh, reset and verify tokens live in the server's token service.

pub mod claims;
pub mod error;
pub mod jwt;

pub use claims::{Claims, TokenKind};
pub use error::TokenError;
pub use jwt::{decode_token, encode_token, verify_token_kind};
