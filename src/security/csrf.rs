//! Anti-forgery sessions for cookie-based (browser) flows.
//!
//! A browser is identified by the `csrf_session` cookie. Each session id
//! maps to one anti-forgery token held server side; unsafe requests must
//! echo that token back in the `X-CSRF-TOKEN` header or a `csrf_token` form
//! field.
//!
//! A session is minted on first contact but only written to the store once
//! its token is handed out, so cookieless traffic that never asks for a
//! token leaves nothing behind. Stored sessions idle for longer than the
//! configured TTL are swept, and the store refuses new sessions while it is
//! full of live ones.
//!
//! Session state sits behind [`CsrfSessionStore`]. The default
//! [`InMemoryCsrfStore`] is a sharded [`DashMap`], so two requests for the
//! same session id are serialized on that id's shard while unrelated
//! sessions proceed in parallel.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use async_trait::async_trait;
use axum::http::StatusCode;
use axum_extra::extract::cookie::{Cookie, SameSite};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use keystone_config::{CsrfConfig, SessionRecovery};
use keystone_core::AppError;
use rand::RngCore;
use rand::rngs::OsRng;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use super::sweep::SweepThrottle;

pub const SESSION_COOKIE: &str = "csrf_session";
pub const HEADER_NAME: &str = "x-csrf-token";
pub const FORM_FIELD: &str = "csrf_token";

const SECRET_BYTES: usize = 32;

#[async_trait]
pub trait CsrfSessionStore: Send + Sync {
    /// The session's token. A hit counts as use for idle expiry.
    async fn get(&self, session_id: &str) -> anyhow::Result<Option<String>>;

    async fn insert(&self, session_id: &str, token: String) -> anyhow::Result<()>;

    /// Stores `candidate` unless the session already has a token, and returns
    /// whichever token is stored afterwards. The check and the write happen
    /// as one step per session id.
    async fn get_or_insert(&self, session_id: &str, candidate: String) -> anyhow::Result<String>;

    async fn remove(&self, session_id: &str) -> anyhow::Result<bool>;

    /// Drops sessions not used within `max_idle`. Returns how many were dropped.
    async fn purge_idle(&self, max_idle: Duration) -> anyhow::Result<usize>;

    async fn len(&self) -> anyhow::Result<usize>;
}

#[derive(Debug, Clone)]
struct StoredSession {
    token: String,
    last_used: Instant,
}

impl StoredSession {
    fn new(token: String) -> Self {
        Self {
            token,
            last_used: Instant::now(),
        }
    }
}

#[derive(Default)]
pub struct InMemoryCsrfStore {
    sessions: DashMap<String, StoredSession>,
}

impl InMemoryCsrfStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CsrfSessionStore for InMemoryCsrfStore {
    async fn get(&self, session_id: &str) -> anyhow::Result<Option<String>> {
        Ok(self.sessions.get_mut(session_id).map(|mut entry| {
            entry.last_used = Instant::now();
            entry.token.clone()
        }))
    }

    async fn insert(&self, session_id: &str, token: String) -> anyhow::Result<()> {
        self.sessions
            .insert(session_id.to_string(), StoredSession::new(token));
        Ok(())
    }

    async fn get_or_insert(&self, session_id: &str, candidate: String) -> anyhow::Result<String> {
        let token = match self.sessions.entry(session_id.to_string()) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().last_used = Instant::now();
                entry.get().token.clone()
            }
            Entry::Vacant(entry) => entry.insert(StoredSession::new(candidate)).token.clone(),
        };
        Ok(token)
    }

    async fn remove(&self, session_id: &str) -> anyhow::Result<bool> {
        Ok(self.sessions.remove(session_id).is_some())
    }

    async fn purge_idle(&self, max_idle: Duration) -> anyhow::Result<usize> {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| session.last_used.elapsed() < max_idle);
        self.sessions.shrink_to_fit();
        Ok(before.saturating_sub(self.sessions.len()))
    }

    async fn len(&self) -> anyhow::Result<usize> {
        Ok(self.sessions.len())
    }
}

/// The session a request was resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfSession {
    pub session_id: String,
    pub token: String,
    /// The browser does not hold this session id yet.
    pub is_new: bool,
    /// The token is in the store. Unstored tokens have never been handed out.
    pub stored: bool,
}

#[derive(Clone)]
pub struct CsrfGuard {
    store: Arc<dyn CsrfSessionStore>,
    config: CsrfConfig,
    inline_sweeps: Arc<SweepThrottle>,
}

impl CsrfGuard {
    pub fn new(store: Arc<dyn CsrfSessionStore>, config: CsrfConfig) -> Self {
        Self {
            store,
            config,
            inline_sweeps: Arc::new(SweepThrottle::default()),
        }
    }

    pub fn config(&self) -> &CsrfConfig {
        &self.config
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.config.session_ttl_secs)
    }

    /// Maps the session cookie (if any) to a session. Read-only: a session
    /// the store does not hold yet is only written by [`persist`](Self::persist).
    pub async fn resolve(&self, cookie: Option<&str>) -> anyhow::Result<CsrfSession> {
        let Some(session_id) = cookie.filter(|id| is_well_formed(id)) else {
            return Ok(Self::fresh_session());
        };

        if let Some(token) = self.store.get(session_id).await? {
            return Ok(CsrfSession {
                session_id: session_id.to_string(),
                token,
                is_new: false,
                stored: true,
            });
        }

        match self.config.recovery {
            SessionRecovery::Lenient => {
                debug!("Recovering CSRF session with no server-side entry");
                Ok(CsrfSession {
                    session_id: session_id.to_string(),
                    token: random_secret(),
                    is_new: false,
                    stored: false,
                })
            }
            SessionRecovery::Strict => {
                debug!("Discarding unknown CSRF session");
                Ok(Self::fresh_session())
            }
        }
    }

    fn fresh_session() -> CsrfSession {
        CsrfSession {
            session_id: random_secret(),
            token: random_secret(),
            is_new: true,
            stored: false,
        }
    }

    /// Writes the session to the store if it is not there yet, and returns
    /// the token the store holds for it. Concurrent calls for one session id
    /// all return the same token.
    ///
    /// When the store is at capacity an idle sweep runs (at most once a
    /// second); if that frees nothing the session is refused with 503.
    pub async fn persist(&self, session: &CsrfSession) -> Result<String, AppError> {
        if session.stored {
            return Ok(session.token.clone());
        }

        let max = self.config.max_sessions;
        if self.store.len().await? >= max {
            if self.inline_sweeps.try_begin() {
                self.sweep().await?;
            }
            if self.store.len().await? >= max {
                warn!(max, "CSRF session store is full");
                return Err(AppError::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    anyhow!("CSRF session store is full"),
                ));
            }
        }

        let token = self
            .store
            .get_or_insert(&session.session_id, session.token.clone())
            .await?;
        Ok(token)
    }

    /// Drops sessions idle for longer than the configured TTL.
    pub async fn sweep(&self) -> anyhow::Result<usize> {
        let dropped = self.store.purge_idle(self.session_ttl()).await?;
        if dropped > 0 {
            debug!(dropped, "Swept idle CSRF sessions");
        }
        Ok(dropped)
    }

    pub async fn stored_sessions(&self) -> anyhow::Result<usize> {
        self.store.len().await
    }

    /// Exact, constant-time comparison of the submitted token. A session
    /// that was never stored has no token a client could know.
    pub fn verify(&self, session: &CsrfSession, submitted: Option<&str>) -> bool {
        if !session.stored {
            return false;
        }
        match submitted {
            Some(submitted) => submitted.as_bytes().ct_eq(session.token.as_bytes()).into(),
            None => false,
        }
    }

    pub fn session_cookie(&self, session_id: &str) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, session_id.to_string()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Strict)
            .secure(self.config.secure_cookie)
            .build()
    }
}

fn random_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Only ids this guard could have minted are honored.
fn is_well_formed(session_id: &str) -> bool {
    session_id.len() == SECRET_BYTES * 2 && session_id.bytes().all(|b| b.is_ascii_hexdigit())
}
