use thiserror::Error;

/// Startup configuration failure. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("JWT_SECRET is not safe for production: {0}")]
    WeakSecret(&'static str),
}
