//! tdb-daemon entry point.
//!
//! Thin on purpose: load config, resolve secrets, connect and migrate the
//! database, build the broker provider, wire middleware and serve. Route
//! handlers live in `routes.rs`; shared state in `state.rs`.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use tdb_config::{
    load_layered_yaml, report_unused_keys, resolve_secrets, DaemonConfig, UnusedKeyPolicy,
};
use tdb_daemon::{routes, state::AppState};
use tdb_db::PgPnlStore;
use tdb_md::{HttpOrderbookProvider, RetryPolicy};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

const ENV_CONFIG_BASE: &str = "TDB_CONFIG_BASE";
const ENV_CONFIG_OVERLAY: &str = "TDB_CONFIG_OVERLAY";
const DEFAULT_CONFIG_BASE: &str = "config/base.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Dev convenience; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let paths = config_paths();
    let path_refs: Vec<&str> = paths.iter().map(String::as_str).collect();
    let loaded = load_layered_yaml(&path_refs).context("config load failed")?;
    info!(config_hash = %loaded.config_hash, "config loaded");

    let unused = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    if !unused.is_clean() {
        warn!(keys = ?unused.unused_leaf_pointers, "config keys not consumed by the daemon");
    }

    let cfg: DaemonConfig = loaded.daemon_config()?;
    let secrets = resolve_secrets(&cfg);
    info!(secrets = ?secrets, "secrets resolved");

    let pool = tdb_db::connect(secrets.require_database_url()?, cfg.db.max_connections).await?;
    tdb_db::migrate(&pool).await?;
    let store = Arc::new(PgPnlStore::new(pool));

    // A missing shared secret does not stop the daemon; broker-backed
    // routes answer PROVIDER_ERROR until it is set.
    let shared_secret = match secrets.require_broker_shared_secret() {
        Ok(s) => s.to_string(),
        Err(err) => {
            warn!(error = %err, "broker routes will fail");
            String::new()
        }
    };
    let provider = Arc::new(
        HttpOrderbookProvider::new_with_base_url(
            cfg.broker.base_url.clone(),
            shared_secret,
            cfg.broker.timeout(),
            RetryPolicy {
                max_retries: cfg.broker.max_retries,
                backoff_base: cfg.broker.backoff_base(),
                backoff_cap: cfg.broker.backoff_cap(),
            },
        )
        .map_err(|e| anyhow::anyhow!("broker provider: {e}"))?,
    );

    let addr: SocketAddr = cfg
        .server
        .addr
        .parse()
        .with_context(|| format!("invalid server.addr '{}'", cfg.server.addr))?;

    let shared = Arc::new(AppState::new(cfg, store, provider)?);

    let app = routes::build_router(shared)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    info!("tdb-daemon listening on http://{}", addr);

    axum::serve(
        tokio::net::TcpListener::bind(addr).await?,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// Base layer, then the optional overlay. Later layers win.
fn config_paths() -> Vec<String> {
    let base = std::env::var(ENV_CONFIG_BASE).unwrap_or_else(|_| DEFAULT_CONFIG_BASE.to_string());
    let mut paths = vec![base];
    if let Ok(overlay) = std::env::var(ENV_CONFIG_OVERLAY) {
        if !overlay.trim().is_empty() {
            paths.push(overlay);
        }
    }
    paths
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET])
        .allow_headers(tower_http::cors::Any)
}
