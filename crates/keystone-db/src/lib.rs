//! # Keystone DB
//!
//! PostgreSQL connection pool initialization.
//!
//! ```ignore
//! use keystone_db::init_db_pool;
//!
//! let pool = init_db_pool(&database_url, 10).await?;
//! sqlx::migrate!("./migrations").run(&pool).await?;
//! ```

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;

pub use sqlx::PgPool;

/// Connects a pool to `database_url`.
///
/// The first connection is established eagerly so a bad URL or an
/// unreachable server fails at startup rather than on the first request.
///
/// # Errors
///
/// Returns the underlying [`sqlx::Error`] if the connection cannot be made.
pub async fn init_db_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;

    tracing::info!(max_connections, "Database pool ready");
    Ok(pool)
}
