//! # mc-api: Binary Entry Point
//!
//! Starts the Axum HTTP/WebSocket server for Migrant Care.
//! Binds to `PORT` (default 3000).

use std::sync::Arc;

use mc_api::state::{AppConfig, AppState};
use mc_presence::{LocationStore, MemoryLocationStore, RedisLocationStore};
use metrics_exporter_prometheus::PrometheusBuilder;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = AppConfig::from_env().map_err(|e| {
        tracing::error!("Invalid configuration: {e}");
        e
    })?;
    tracing::info!(?config, "Configuration loaded");

    let metrics_handle = if config.metrics_enabled {
        Some(PrometheusBuilder::new().install_recorder().map_err(|e| {
            tracing::error!("Failed to install Prometheus recorder: {e}");
            e
        })?)
    } else {
        None
    };

    // Location cache: Redis when configured, process memory otherwise.
    let locations: Arc<dyn LocationStore> = match std::env::var("REDIS_URL") {
        Ok(url) if !url.is_empty() => {
            let store = RedisLocationStore::connect(&url, config.location_ttl)
                .await
                .map_err(|e| {
                    tracing::error!("Redis connection failed: {e}");
                    e
                })?;
            tracing::info!("Connected to Redis location cache");
            Arc::new(store)
        }
        _ => {
            tracing::warn!(
                "REDIS_URL not set, keeping worker locations in process memory. \
                 Locations will not survive restarts."
            );
            Arc::new(MemoryLocationStore::new())
        }
    };

    // Database pool is optional; absent means in-memory only.
    let db_pool = mc_api::db::init_pool().await.map_err(|e| {
        tracing::error!("Database initialization failed: {e}");
        e
    })?;

    let port = config.port;
    let mut state = AppState::with_backends(config, locations, db_pool);
    if let Some(handle) = metrics_handle {
        state = state.with_metrics(handle);
    }

    state.hydrate_from_db().await.map_err(|e| {
        tracing::error!("Database hydration failed: {e}");
        e
    })?;

    let app = mc_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Migrant Care API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Human-readable logs by default, JSON lines when `MC_LOG_FORMAT=json`.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var("MC_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
