pub mod auth;
pub mod tokens;
pub mod users;
