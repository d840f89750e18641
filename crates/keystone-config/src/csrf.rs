use std::str::FromStr;

use crate::app::Environment;
use crate::env::{self, Lookup};
use crate::error::ConfigError;

/// What to do when a request presents a session cookie the server has no entry for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionRecovery {
    /// Mint a new token under the same session id and keep the cookie.
    #[default]
    Lenient,
    /// Drop the unknown id and start a new session with a new cookie.
    Strict,
}

impl FromStr for SessionRecovery {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lenient" => Ok(SessionRecovery::Lenient),
            "strict" => Ok(SessionRecovery::Strict),
            other => Err(format!("expected \"lenient\" or \"strict\", got {other:?}")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CsrfConfig {
    pub recovery: SessionRecovery,
    /// Skip validation for requests that authenticate with a bearer token and
    /// carry no session cookie.
    pub exempt_bearer: bool,
    pub secure_cookie: bool,
    /// Sessions unused for this long are dropped by the sweep.
    pub session_ttl_secs: u64,
    /// Store size that triggers an inline sweep; new sessions are refused
    /// while it stays full.
    pub max_sessions: usize,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            recovery: SessionRecovery::Lenient,
            exempt_bearer: true,
            secure_cookie: false,
            session_ttl_secs: 24 * 60 * 60,
            max_sessions: 100_000,
        }
    }
}

impl CsrfConfig {
    pub fn from_env(environment: Environment) -> Result<Self, ConfigError> {
        Self::from_lookup(&env::process_env, environment)
    }

    pub fn from_lookup(lookup: Lookup<'_>, environment: Environment) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            recovery: env::parse_or(lookup, "CSRF_SESSION_RECOVERY", SessionRecovery::Lenient)?,
            exempt_bearer: env::flag(lookup, "CSRF_EXEMPT_BEARER", true)?,
            secure_cookie: env::flag(lookup, "CSRF_SECURE_COOKIE", environment.is_production())?,
            session_ttl_secs: env::parse_or(
                lookup,
                "CSRF_SESSION_TTL_SECS",
                defaults.session_ttl_secs,
            )?,
            max_sessions: env::parse_or(lookup, "CSRF_MAX_SESSIONS", defaults.max_sessions)?,
        })
    }
}
