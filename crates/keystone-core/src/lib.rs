//! # Keystone Core
//!
//! Foundational types shared by every Keystone crate:
//!
//! - [`errors`]: [`AppError`] and the JSON error envelope
//! - [`pagination`]: page/limit parsing and the paginated response shape
//! - [`password`]: bcrypt hashing and verification

pub mod errors;
pub mod pagination;
pub mod password;

pub use errors::{AppError, ErrorBody};
pub use pagination::{PageRequest, Paginated};
pub use password::{hash_password, verify_password};
