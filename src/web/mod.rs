//! Web server module.

mod handlers;

pub use handlers::*;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::refresh::RefreshController;
use crate::status::StatusBoard;
use crate::store::KvStore;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub board: Arc<StatusBoard>,
    pub store: KvStore,
    pub controller: Arc<RefreshController>,
    /// Serializes the read-modify-write cycle on the stored blob.
    pub ingest_lock: Arc<tokio::sync::Mutex<()>>,
}

/// Status page web server.
pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(board: Arc<StatusBoard>, store: KvStore, controller: Arc<RefreshController>) -> Self {
        Self {
            state: AppState {
                board,
                store,
                controller,
                ingest_lock: Arc::new(tokio::sync::Mutex::new(())),
            },
        }
    }

    /// Build the router with all routes.
    pub fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

        Router::new()
            // Status page with the compacted blob embedded
            .route("/", get(handlers::handle_index))
            // API endpoints
            .route("/api/data", get(handlers::handle_data))
            .route("/api/status", get(handlers::handle_status))
            .route("/api/monitors/{id}", get(handlers::handle_monitor))
            .route("/api/report", post(handlers::handle_report))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .layer(DefaultBodyLimit::max(64 * 1024))
            .with_state(self.state.clone())
    }

    /// Start the server on the given port.
    pub async fn start(&self, port: u16) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let router = self.routes();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
