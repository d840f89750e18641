//! Request admission state: anti-forgery sessions, per-client rate limits
//! and client identification. The HTTP side lives in [`crate::middleware`].

pub mod client_ip;
pub mod csrf;
pub mod rate_limit;
pub mod sweep;

pub use client_ip::client_key;
pub use csrf::{CsrfGuard, CsrfSession, CsrfSessionStore, InMemoryCsrfStore};
pub use rate_limit::{ClientLimiter, TokenBucketLimiter};
