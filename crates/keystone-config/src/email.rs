use crate::env::{self, Lookup};
use crate::error::ConfigError;

#[derive(Clone)]
pub struct EmailConfig {
    /// Empty means emails are only logged.
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"<redacted>")
            .field("from", &self.from)
            .finish()
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: String::new(),
            smtp_port: 587,
            smtp_username: String::new(),
            smtp_password: String::new(),
            from: "Keystone <noreply@keystone.local>".to_string(),
        }
    }
}

impl EmailConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&env::process_env)
    }

    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            smtp_host: env::string(lookup, "SMTP_HOST").unwrap_or(defaults.smtp_host),
            smtp_port: env::parse_or(lookup, "SMTP_PORT", defaults.smtp_port)?,
            smtp_username: env::string(lookup, "SMTP_USERNAME").unwrap_or_default(),
            smtp_password: env::string(lookup, "SMTP_PASSWORD").unwrap_or_default(),
            from: env::string(lookup, "EMAIL_FROM").unwrap_or(defaults.from),
        })
    }

    pub fn smtp_enabled(&self) -> bool {
        !self.smtp_host.is_empty()
    }
}
