use std::str::FromStr;

use crate::env::{self, Lookup};
use crate::error::ConfigError;

/// Backing store for users and tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DbDriver {
    #[default]
    Postgres,
    /// Process-local maps; state is lost on restart.
    Memory,
}

impl FromStr for DbDriver {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(DbDriver::Postgres),
            "memory" => Ok(DbDriver::Memory),
            other => Err(format!("unsupported driver {other:?}")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub driver: DbDriver,
    pub url: Option<String>,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&env::process_env)
    }

    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        let driver = env::parse_or(lookup, "DB_DRIVER", DbDriver::Postgres)?;
        let url = env::string(lookup, "DATABASE_URL");

        if driver == DbDriver::Postgres && url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        Ok(Self {
            driver,
            url,
            max_connections: env::parse_or(lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::map_lookup;

    #[test]
    fn test_postgres_requires_url() {
        let err = DatabaseConfig::from_lookup(&map_lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn test_memory_driver_needs_no_url() {
        let config = DatabaseConfig::from_lookup(&map_lookup(&[("DB_DRIVER", "memory")])).unwrap();
        assert_eq!(config.driver, DbDriver::Memory);
        assert!(config.url.is_none());
    }
}
