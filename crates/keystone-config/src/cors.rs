use crate::env::{self, Lookup};

#[derive(Clone, Debug)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

const DEFAULT_ORIGINS: &str = "http://localhost:8080,http://localhost:5173";

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: split_origins(DEFAULT_ORIGINS),
        }
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl CorsConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(&env::process_env)
    }

    pub fn from_lookup(lookup: Lookup<'_>) -> Self {
        match env::string(lookup, "ALLOWED_ORIGINS") {
            Some(raw) => Self {
                allowed_origins: split_origins(&raw),
            },
            None => Self::default(),
        }
    }
}
