pub mod controller;
pub mod repository;
pub mod router;
pub mod service;

pub use repository::{InMemoryUserRepository, PgUserRepository, UserRepository};
pub use router::init_users_router;
pub use service::UserService;
