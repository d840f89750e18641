use std::fs;
use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::security::client_key;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// One event per request, levelled by status class.
pub async fn logging_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let client_ip = client_key(
        req.headers(),
        req.extensions(),
        state.rate_limit_config.trust_forwarded_for,
    );
    let request_id = uuid::Uuid::new_v4().to_string();

    let response = next.run(req).await;
    let latency_ms = start.elapsed().as_millis() as u64;
    let status = response.status().as_u16();

    match status {
        500..=599 => error!(
            request_id = %request_id,
            method = %method,
            path = %path,
            status,
            latency_ms,
            client_ip = %client_ip,
            "Server error"
        ),
        400..=499 => warn!(
            request_id = %request_id,
            method = %method,
            path = %path,
            status,
            latency_ms,
            client_ip = %client_ip,
            "Client error"
        ),
        _ => info!(
            request_id = %request_id,
            method = %method,
            path = %path,
            status,
            latency_ms,
            client_ip = %client_ip,
            "Request completed"
        ),
    }

    response
}

/// Installs the global subscriber.
///
/// - console: compact, or JSON when `LOG_FORMAT=json`, filtered by `RUST_LOG`
/// - file: daily rolling JSON under `LOG_DIR`, only when that is set
pub fn init_tracing() -> anyhow::Result<()> {
    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{}=info,tower_http=warn,sqlx=warn",
            env!("CARGO_CRATE_NAME")
        ))
    });

    let format = LogFormat::parse(std::env::var("LOG_FORMAT").ok().as_deref());
    let console_layer: Box<dyn Layer<Registry> + Send + Sync> = match format {
        LogFormat::Json => fmt::layer().json().with_current_span(true).boxed(),
        LogFormat::Compact => fmt::layer()
            .with_target(false)
            .with_file(true)
            .with_line_number(true)
            .compact()
            .boxed(),
    };

    let file_layer = match std::env::var("LOG_DIR").ok().filter(|d| !d.trim().is_empty()) {
        Some(log_dir) => {
            fs::create_dir_all(&log_dir)?;
            let appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "keystone.json");
            Some(
                fmt::layer()
                    .json()
                    .with_writer(appender)
                    .with_ansi(false)
                    .with_current_span(true)
                    .with_filter(EnvFilter::new("info")),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console_layer.with_filter(console_filter))
        .with(file_layer)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse(Some("json")), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some(" JSON ")), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some("pretty")), LogFormat::Compact);
        assert_eq!(LogFormat::parse(None), LogFormat::Compact);
    }
}
