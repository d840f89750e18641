//! Background maintenance for the token store, the CSRF session store and
//! the rate limiter registry.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::modules::tokens::TokenService;
use crate::security::{ClientLimiter, CsrfGuard};
use crate::state::AppState;

const TOKEN_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);
const CSRF_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

pub async fn purge_expired_tokens(tokens: &TokenService) {
    match tokens.purge_expired().await {
        Ok(count) if count > 0 => info!("Cleaned up {} expired tokens", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up expired tokens: {}", e),
    }
}

pub fn spawn_token_cleanup(tokens: TokenService) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TOKEN_CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            purge_expired_tokens(&tokens).await;
        }
    })
}

pub async fn sweep_csrf_sessions(csrf: &CsrfGuard) {
    match csrf.sweep().await {
        Ok(dropped) if dropped > 0 => info!("Dropped {} idle CSRF sessions", dropped),
        Ok(_) => {}
        Err(e) => error!("Failed to sweep CSRF sessions: {}", e),
    }
}

pub fn spawn_csrf_sweep(csrf: CsrfGuard) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CSRF_SWEEP_INTERVAL);

        loop {
            interval.tick().await;
            sweep_csrf_sessions(&csrf).await;
        }
    })
}

pub fn spawn_rate_limit_sweep(limiter: Arc<dyn ClientLimiter>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);

        loop {
            interval.tick().await;
            let evicted = limiter.sweep();
            if evicted > 0 {
                debug!(evicted, tracked = limiter.tracked_clients(), "Swept idle rate limit buckets");
            }
        }
    })
}

/// Starts every maintenance task the state needs.
pub fn spawn_background_tasks(state: &AppState) -> Vec<JoinHandle<()>> {
    let mut handles = vec![
        spawn_token_cleanup(state.tokens.clone()),
        spawn_csrf_sweep(state.csrf.clone()),
    ];

    if let Some(limiter) = state.rate_limiter.clone() {
        let every = Duration::from_secs(state.rate_limit_config.sweep_interval_secs.max(1));
        handles.push(spawn_rate_limit_sweep(limiter, every));
    }

    handles
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;
    use keystone_auth::TokenKind;
    use keystone_config::{CsrfConfig, JwtConfig};
    use uuid::Uuid;

    use super::*;
    use crate::modules::tokens::InMemoryTokenStore;
    use crate::security::{CsrfSessionStore, InMemoryCsrfStore};

    #[tokio::test]
    async fn test_purge_removes_expired_tokens() {
        let store = Arc::new(InMemoryTokenStore::new());
        let tokens = TokenService::new(store.clone(), JwtConfig::new("tasks-test-secret"));
        let subject = Uuid::new_v4();

        tokens
            .issue_single_use_token(subject, TokenKind::ResetPassword, ChronoDuration::seconds(-120))
            .await
            .unwrap();
        tokens
            .issue_single_use_token(subject, TokenKind::VerifyEmail, ChronoDuration::minutes(10))
            .await
            .unwrap();
        assert_eq!(store.len(), 2);

        purge_expired_tokens(&tokens).await;
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_csrf_sweep_drops_idle_sessions() {
        let store = Arc::new(InMemoryCsrfStore::new());
        let config = CsrfConfig {
            session_ttl_secs: 0,
            ..CsrfConfig::default()
        };
        let csrf = CsrfGuard::new(store.clone(), config);
        let session = csrf.resolve(None).await.unwrap();
        csrf.persist(&session).await.unwrap();
        assert_eq!(store.len().await.unwrap(), 1);

        sweep_csrf_sessions(&csrf).await;
        assert_eq!(store.len().await.unwrap(), 0);
    }
}
