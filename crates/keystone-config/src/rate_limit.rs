use crate::app::Environment;
use crate::env::{self, Lookup};
use crate::error::ConfigError;

/// Token-bucket limits applied per client.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    /// Off by default outside production.
    pub enabled: bool,
    /// Bucket size, i.e. the largest burst a client can send.
    pub capacity: u32,
    /// Tokens added back per second.
    pub refill_per_second: u32,
    /// Registry size that triggers an inline sweep of idle clients.
    pub max_tracked_clients: usize,
    pub sweep_interval_secs: u64,
    /// Key clients by the first `X-Forwarded-For` hop instead of the peer address.
    pub trust_forwarded_for: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            capacity: 20,
            refill_per_second: 5,
            max_tracked_clients: 10_000,
            sweep_interval_secs: 60,
            trust_forwarded_for: false,
        }
    }
}

impl RateLimitConfig {
    pub fn from_env(environment: Environment) -> Result<Self, ConfigError> {
        Self::from_lookup(&env::process_env, environment)
    }

    pub fn from_lookup(lookup: Lookup<'_>, environment: Environment) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            enabled: env::flag(lookup, "RATE_LIMIT_ENABLED", environment.is_production())?,
            capacity: env::parse_or(lookup, "RATE_LIMIT_CAPACITY", defaults.capacity)?,
            refill_per_second: env::parse_or(
                lookup,
                "RATE_LIMIT_REFILL_PER_SECOND",
                defaults.refill_per_second,
            )?,
            max_tracked_clients: env::parse_or(
                lookup,
                "RATE_LIMIT_MAX_TRACKED_CLIENTS",
                defaults.max_tracked_clients,
            )?,
            sweep_interval_secs: env::parse_or(
                lookup,
                "RATE_LIMIT_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval_secs,
            )?,
            trust_forwarded_for: env::flag(
                lookup,
                "TRUST_FORWARDED_FOR",
                defaults.trust_forwarded_for,
            )?,
        };

        if config.capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "RATE_LIMIT_CAPACITY",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if config.refill_per_second == 0 {
            return Err(ConfigError::Invalid {
                key: "RATE_LIMIT_REFILL_PER_SECOND",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(config)
    }
}
