use crate::app::Environment;
use crate::env::{self, Lookup};
use crate::error::ConfigError;

/// Fallback secret for local development. Refused in production.
pub const DEVELOPMENT_SECRET: &str = "default_secret_please_change";

const MIN_PRODUCTION_SECRET_LEN: usize = 32;

#[derive(Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub access_expiration_minutes: i64,
    pub refresh_expiration_days: i64,
    pub reset_password_expiration_minutes: i64,
    pub verify_email_expiration_minutes: i64,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("access_expiration_minutes", &self.access_expiration_minutes)
            .field("refresh_expiration_days", &self.refresh_expiration_days)
            .field(
                "reset_password_expiration_minutes",
                &self.reset_password_expiration_minutes,
            )
            .field(
                "verify_email_expiration_minutes",
                &self.verify_email_expiration_minutes,
            )
            .finish()
    }
}

impl JwtConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            access_expiration_minutes: 30,
            refresh_expiration_days: 30,
            reset_password_expiration_minutes: 10,
            verify_email_expiration_minutes: 10,
        }
    }

    pub fn from_env(environment: Environment) -> Result<Self, ConfigError> {
        Self::from_lookup(&env::process_env, environment)
    }

    pub fn from_lookup(lookup: Lookup<'_>, environment: Environment) -> Result<Self, ConfigError> {
        let secret = env::string(lookup, "JWT_SECRET");

        if environment.is_production() {
            match secret.as_deref() {
                None => return Err(ConfigError::WeakSecret("not set")),
                Some(DEVELOPMENT_SECRET) => {
                    return Err(ConfigError::WeakSecret("still the development default"));
                }
                Some(s) if s.len() < MIN_PRODUCTION_SECRET_LEN => {
                    return Err(ConfigError::WeakSecret("shorter than 32 bytes"));
                }
                Some(_) => {}
            }
        }

        let defaults = Self::new(DEVELOPMENT_SECRET);
        let config = Self {
            secret: secret.unwrap_or(defaults.secret),
            access_expiration_minutes: env::parse_or(
                lookup,
                "JWT_ACCESS_EXPIRATION_MINUTES",
                defaults.access_expiration_minutes,
            )?,
            refresh_expiration_days: env::parse_or(
                lookup,
                "JWT_REFRESH_EXPIRATION_DAYS",
                defaults.refresh_expiration_days,
            )?,
            reset_password_expiration_minutes: env::parse_or(
                lookup,
                "JWT_RESET_PASSWORD_EXPIRATION_MINUTES",
                defaults.reset_password_expiration_minutes,
            )?,
            verify_email_expiration_minutes: env::parse_or(
                lookup,
                "JWT_VERIFY_EMAIL_EXPIRATION_MINUTES",
                defaults.verify_email_expiration_minutes,
            )?,
        };

        for (key, value) in [
            ("JWT_ACCESS_EXPIRATION_MINUTES", config.access_expiration_minutes),
            ("JWT_REFRESH_EXPIRATION_DAYS", config.refresh_expiration_days),
            (
                "JWT_RESET_PASSWORD_EXPIRATION_MINUTES",
                config.reset_password_expiration_minutes,
            ),
            (
                "JWT_VERIFY_EMAIL_EXPIRATION_MINUTES",
                config.verify_email_expiration_minutes,
            ),
        ] {
            if value <= 0 {
                return Err(ConfigError::Invalid {
                    key,
                    value: value.to_string(),
                    reason: "must be positive".to_string(),
                });
            }
        }

        Ok(config)
    }

    pub fn uses_development_secret(&self) -> bool {
        self.secret == DEVELOPMENT_SECRET
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::map_lookup;

    #[test]
    fn test_development_falls_back_to_default_secret() {
        let config = JwtConfig::from_lookup(&map_lookup(&[]), Environment::Development).unwrap();
        assert!(config.uses_development_secret());
        assert_eq!(config.access_expiration_minutes, 30);
        assert_eq!(config.refresh_expiration_days, 30);
        assert_eq!(config.reset_password_expiration_minutes, 10);
        assert_eq!(config.verify_email_expiration_minutes, 10);
    }

    #[test]
    fn test_production_rejects_missing_secret() {
        let err = JwtConfig::from_lookup(&map_lookup(&[]), Environment::Production).unwrap_err();
        assert!(matches!(err, ConfigError::WeakSecret(_)));
    }

    #[test]
    fn test_production_rejects_default_and_short_secrets() {
        let lookup = map_lookup(&[("JWT_SECRET", DEVELOPMENT_SECRET)]);
        assert!(JwtConfig::from_lookup(&lookup, Environment::Production).is_err());

        let lookup = map_lookup(&[("JWT_SECRET", "short")]);
        assert!(JwtConfig::from_lookup(&lookup, Environment::Production).is_err());
    }

    #[test]
    fn test_production_accepts_strong_secret() {
        let lookup = map_lookup(&[
            ("JWT_SECRET", "a-very-long-production-secret-0123456789"),
            ("JWT_ACCESS_EXPIRATION_MINUTES", "15"),
        ]);
        let config = JwtConfig::from_lookup(&lookup, Environment::Production).unwrap();
        assert_eq!(config.access_expiration_minutes, 15);
        assert!(!config.uses_development_secret());
    }

    #[test]
    fn test_non_positive_ttl_is_fatal() {
        let lookup = map_lookup(&[("JWT_REFRESH_EXPIRATION_DAYS", "0")]);
        assert!(JwtConfig::from_lookup(&lookup, Environment::Development).is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = JwtConfig::new("super-secret-value");
        assert!(!format!("{config:?}").contains("super-secret-value"));
    }
}
