//! Registration, login and the token flows built on them: refresh
//! rotation, logout, password reset and email verification.

pub mod controller;
pub mod router;
pub mod service;

pub use router::init_auth_router;
pub use service::AuthService;
