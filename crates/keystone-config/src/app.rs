use std::fmt;
use std::str::FromStr;

use crate::env::{self, Lookup};
use crate::error::ConfigError;

/// Deployment environment, from `APP_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Test => "test",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" => Ok(Environment::Development),
            "test" | "testing" => Ok(Environment::Test),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment {other:?}")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub name: String,
    pub environment: Environment,
    /// Public base URL used when building links in emails.
    pub url: String,
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "keystone".to_string(),
            environment: Environment::Development,
            url: "http://localhost:8080".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 30,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&env::process_env)
    }

    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            name: env::string(lookup, "APP_NAME").unwrap_or(defaults.name),
            environment: env::parse_or(lookup, "APP_ENV", defaults.environment)?,
            url: env::string(lookup, "APP_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.url),
            host: env::string(lookup, "HOST").unwrap_or(defaults.host),
            port: env::parse_or(lookup, "PORT", defaults.port)?,
            request_timeout_secs: env::parse_or(
                lookup,
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            )?,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
