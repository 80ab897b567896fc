use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use chrono_tz::Tz;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    handlers::{create_snippet, get_snippet, health, index, not_found},
    service::{SnippetService, DEFAULT_MAX_TTL_SECS, DEFAULT_TTL_SECS},
    store::{Cipher, Store},
    sweeper::{spawn_sweeper, DEFAULT_SWEEP_INTERVAL},
    AppState, DisplayZone,
};

pub const KEY_FILE: &str = "snipvault.key";
pub const DB_FILE: &str = "snipvault.db";

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: Option<PathBuf>,
    pub sweep_interval: Duration,
    pub max_ttl_secs: i64,
    pub default_ttl_secs: i64,
    pub display: DisplayZone,
    pub cors_origins: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("SNIPVAULT_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_parse("SNIPVAULT_PORT").unwrap_or(5002),
            data_dir: std::env::var("SNIPVAULT_DATA_DIR").ok().map(PathBuf::from),
            sweep_interval: env_parse("SNIPVAULT_SWEEP_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_SWEEP_INTERVAL),
            max_ttl_secs: env_parse("SNIPVAULT_MAX_TTL_SECS").unwrap_or(DEFAULT_MAX_TTL_SECS),
            default_ttl_secs: env_parse("SNIPVAULT_DEFAULT_TTL_SECS").unwrap_or(DEFAULT_TTL_SECS),
            display: display_zone_from_env(),
            cors_origins: std::env::var("SNIPVAULT_CORS_ORIGINS").ok(),
        }
    }
}

impl ServerConfig {
    /// Reject settings that would make every create request fail.
    pub fn validate(&self) -> Result<()> {
        if self.max_ttl_secs < 1 {
            anyhow::bail!("max TTL must be at least 1 second, got {}", self.max_ttl_secs);
        }
        if !(1..=self.max_ttl_secs).contains(&self.default_ttl_secs) {
            anyhow::bail!(
                "default TTL {} is outside 1..={}",
                self.default_ttl_secs,
                self.max_ttl_secs
            );
        }
        if self.sweep_interval.is_zero() {
            anyhow::bail!("sweep interval must be non-zero");
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn display_zone_from_env() -> DisplayZone {
    let fallback = DisplayZone::default();
    let tz = match std::env::var("SNIPVAULT_TIMEZONE") {
        Ok(name) => name.trim().parse::<Tz>().unwrap_or_else(|_| {
            tracing::warn!(timezone = %name, "unknown SNIPVAULT_TIMEZONE; using {}", fallback.tz);
            fallback.tz
        }),
        Err(_) => fallback.tz,
    };
    let label = std::env::var("SNIPVAULT_TIMEZONE_LABEL").unwrap_or(fallback.label);
    DisplayZone::new(tz, label)
}

/// Resolve the data directory (the configured one, else the platform
/// default) and make sure it exists.
pub fn resolve_data_dir(data_dir: Option<&PathBuf>) -> Result<PathBuf> {
    let dir = match data_dir {
        Some(d) => d.clone(),
        None => crate::dirs::platform_data_dir()?,
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("create data dir {}", dir.display()))?;
    Ok(dir)
}

/// Build the HTTP router around an already-constructed state.
pub fn router(state: AppState, cors_origins: Option<&str>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/snippets", post(create_snippet))
        .route("/api/snippets/{id}", get(get_snippet))
        .fallback(not_found)
        .with_state(state)
        .layer(build_cors(cors_origins))
        .layer(TraceLayer::new_for_http())
}

pub async fn run(cfg: ServerConfig) -> Result<()> {
    cfg.validate()?;

    let data_dir = resolve_data_dir(cfg.data_dir.as_ref())?;
    info!(data_dir = %data_dir.display(), "using data directory");

    // The key must be usable before anything is served.
    let cipher = Cipher::load_or_generate(&data_dir.join(KEY_FILE)).context("load encryption key")?;
    let store = Store::open(&data_dir.join(DB_FILE)).context("open store")?;

    let service = SnippetService::new(Arc::new(cipher), store).with_max_ttl(cfg.max_ttl_secs);
    let sweeper = spawn_sweeper(service.store().clone(), service.clock(), cfg.sweep_interval);

    let state = AppState {
        service,
        default_ttl_secs: cfg.default_ttl_secs,
        display: cfg.display,
    };
    let app = router(state, cfg.cors_origins.as_deref());

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    info!(%addr, "snipvault server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind listener")?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error");

    sweeper.shutdown().await;
    info!("snipvault server stopped");
    served
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}

fn build_cors(origins: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([http::Method::GET, http::Method::POST, http::Method::OPTIONS])
        .allow_headers(Any);

    match origins {
        Some(o) => {
            let origins: Vec<_> = o.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            cors.allow_origin(origins)
        }
        None => cors.allow_origin(Any),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            data_dir: None,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            max_ttl_secs: DEFAULT_MAX_TTL_SECS,
            default_ttl_secs: DEFAULT_TTL_SECS,
            display: DisplayZone::utc(),
            cors_origins: None,
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn default_ttl_must_fit_under_max() {
        let cfg = ServerConfig {
            max_ttl_secs: 60,
            default_ttl_secs: 61,
            ..config()
        };
        assert!(cfg.validate().is_err());
        let cfg = ServerConfig {
            max_ttl_secs: 0,
            default_ttl_secs: 0,
            ..config()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn configured_data_dir_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let wanted = tmp.path().join("nested").join("data");
        let resolved = resolve_data_dir(Some(&wanted)).unwrap();
        assert_eq!(resolved, wanted);
        assert!(wanted.is_dir());
        // Resolving an existing directory again is fine.
        assert_eq!(resolve_data_dir(Some(&wanted)).unwrap(), wanted);
    }

    #[test]
    fn zero_sweep_interval_is_rejected() {
        let cfg = ServerConfig {
            sweep_interval: Duration::ZERO,
            ..config()
        };
        assert!(cfg.validate().is_err());
    }
}
