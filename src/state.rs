use std::sync::Arc;
use std::time::Duration;

use keystone_config::{
    AppConfig, ConfigError, CorsConfig, CsrfConfig, DatabaseConfig, DbDriver, EmailConfig,
    JwtConfig, RateLimitConfig,
};
use keystone_db::{PgPool, init_db_pool};
use tracing::{info, warn};

use crate::modules::tokens::{InMemoryTokenStore, PgTokenStore, TokenService, TokenStore};
use crate::modules::users::repository::{
    InMemoryUserRepository, PgUserRepository, UserRepository,
};
use crate::security::{
    ClientLimiter, CsrfGuard, CsrfSessionStore, InMemoryCsrfStore, TokenBucketLimiter,
};
use crate::utils::email::{EmailService, Mailer, mailer_from_config};

/// Everything the server reads at startup.
#[derive(Clone, Debug)]
pub struct Settings {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub rate_limit: RateLimitConfig,
    pub csrf: CsrfConfig,
    pub cors: CorsConfig,
    pub email: EmailConfig,
}

impl Settings {
    /// Loads every section from the environment. Any error is fatal.
    pub fn from_env() -> Result<Self, ConfigError> {
        let app = AppConfig::from_env()?;
        let environment = app.environment;

        Ok(Self {
            database: DatabaseConfig::from_env()?,
            jwt: JwtConfig::from_env(environment)?,
            rate_limit: RateLimitConfig::from_env(environment)?,
            csrf: CsrfConfig::from_env(environment)?,
            cors: CorsConfig::from_env(),
            email: EmailConfig::from_env()?,
            app,
        })
    }

    /// Development defaults over in-memory storage, signing with `secret`.
    pub fn in_memory(secret: impl Into<String>) -> Self {
        Self {
            app: AppConfig::default(),
            database: DatabaseConfig {
                driver: DbDriver::Memory,
                url: None,
                max_connections: 1,
            },
            jwt: JwtConfig::new(secret),
            rate_limit: RateLimitConfig::default(),
            csrf: CsrfConfig::default(),
            cors: CorsConfig::default(),
            email: EmailConfig::default(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub app_config: AppConfig,
    pub cors_config: CorsConfig,
    pub rate_limit_config: RateLimitConfig,
    pub users: Arc<dyn UserRepository>,
    pub tokens: TokenService,
    pub email: EmailService,
    pub csrf: CsrfGuard,
    /// `None` when rate limiting is disabled.
    pub rate_limiter: Option<Arc<dyn ClientLimiter>>,
}

impl AppState {
    /// Wires the state from explicit collaborators.
    pub fn build(
        settings: Settings,
        users: Arc<dyn UserRepository>,
        token_store: Arc<dyn TokenStore>,
        csrf_store: Arc<dyn CsrfSessionStore>,
        mailer: Arc<dyn Mailer>,
    ) -> anyhow::Result<Self> {
        let rate_limiter: Option<Arc<dyn ClientLimiter>> = if settings.rate_limit.enabled {
            Some(Arc::new(TokenBucketLimiter::new(&settings.rate_limit)?))
        } else {
            None
        };

        Ok(Self {
            email: EmailService::new(mailer, settings.app.url.clone()),
            tokens: TokenService::new(token_store, settings.jwt),
            csrf: CsrfGuard::new(csrf_store, settings.csrf),
            app_config: settings.app,
            cors_config: settings.cors,
            rate_limit_config: settings.rate_limit,
            users,
            rate_limiter,
        })
    }

    /// State backed entirely by process memory.
    pub fn in_memory(settings: Settings, mailer: Arc<dyn Mailer>) -> anyhow::Result<Self> {
        Self::build(
            settings,
            Arc::new(InMemoryUserRepository::new()),
            Arc::new(InMemoryTokenStore::new()),
            Arc::new(InMemoryCsrfStore::new()),
            mailer,
        )
    }

    pub fn with_postgres(
        settings: Settings,
        pool: PgPool,
        mailer: Arc<dyn Mailer>,
    ) -> anyhow::Result<Self> {
        Self::build(
            settings,
            Arc::new(PgUserRepository::new(pool.clone())),
            Arc::new(PgTokenStore::new(pool)),
            Arc::new(InMemoryCsrfStore::new()),
            mailer,
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.app_config.request_timeout_secs)
    }
}

/// Connects storage for the configured driver and runs migrations.
pub async fn init_app_state(settings: Settings) -> anyhow::Result<AppState> {
    let mailer = mailer_from_config(&settings.email)?;
    if !settings.email.smtp_enabled() {
        warn!("SMTP_HOST is not set; emails will only be logged");
    }

    match settings.database.driver {
        DbDriver::Memory => {
            warn!("Using in-memory storage; all data is lost on restart");
            AppState::in_memory(settings, mailer)
        }
        DbDriver::Postgres => {
            let url = settings
                .database
                .url
                .as_deref()
                .ok_or(ConfigError::Missing("DATABASE_URL"))?;
            let pool = init_db_pool(url, settings.database.max_connections).await?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            info!("Database migrations applied");
            AppState::with_postgres(settings, pool, mailer)
        }
    }
}
