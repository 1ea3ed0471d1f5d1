//! Uptrail - uptime status page server.
//!
//! Serves the status page and query API from the compacted monitor state,
//! refreshed on an interval; probe results arrive from an external
//! collector through the report endpoint.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use uptrail::config::AppConfig;
use uptrail::refresh::{RefreshController, StoreSource};
use uptrail::status::StatusBoard;
use uptrail::store::KvStore;
use uptrail::web::Server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("uptrail=info".parse()?),
        )
        .init();

    // Load configuration
    let cfg = AppConfig::load()?;
    tracing::info!(
        "Starting uptrail on port {} with {} monitors...",
        cfg.http_port,
        cfg.monitors.len()
    );
    tracing::info!("Using state store at {}", cfg.db_path);

    // Open the state store
    let store = KvStore::open(&cfg.db_path)?;

    // Refresh loop keeping the live state slot current
    let controller = RefreshController::new(
        Arc::new(StoreSource::new(store.clone())),
        Duration::from_secs(cfg.refresh_interval_secs),
    );
    let _stop = controller.start();

    // Start web server
    let port = cfg.http_port;
    let board = Arc::new(StatusBoard::new(cfg));
    let server = Server::new(board, store, controller);
    server.start(port).await?;

    Ok(())
}
